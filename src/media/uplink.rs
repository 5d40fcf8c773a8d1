//! Audio Uplink - Mikrofon → PCM16 Blöcke
//!
//! Der Aufnahme-Callback läuft im Audio-Thread und schneidet den
//! Sample-Strom in Blöcke fester Größe. Fertige Blöcke gehen als Event an
//! den Controller, der sie kodiert und versendet.

use super::capture::{AudioTrack, CaptureStream, MediaError};
use super::pcm::{encode_pcm16, pcm16_to_bytes, UPLINK_BLOCK_SIZE, UPLINK_SAMPLE_RATE};
use crate::session::EventSender;
use crate::transport::OutboundMessage;
use ringbuf::{traits::*, HeapRb};

// ============================================================================
// BLOCK CHUNKER
// ============================================================================

/// Schneidet einen kontinuierlichen Sample-Strom in Blöcke fester Größe
pub struct BlockChunker {
    buffer: HeapRb<f32>,
    block_size: usize,
}

impl BlockChunker {
    pub fn new(block_size: usize) -> Self {
        Self {
            buffer: HeapRb::new(block_size * 2),
            block_size,
        }
    }

    /// Anzahl gepufferter Samples, die noch keinen vollen Block ergeben
    pub fn pending(&self) -> usize {
        self.buffer.occupied_len()
    }

    /// Nimmt Samples auf und ruft `emit` für jeden vollen Block auf
    pub fn push(&mut self, mut samples: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        while !samples.is_empty() {
            let written = self.buffer.push_slice(samples);
            samples = &samples[written..];

            while self.buffer.occupied_len() >= self.block_size {
                let mut block = vec![0.0f32; self.block_size];
                self.buffer.pop_slice(&mut block);
                emit(block);
            }

            if written == 0 {
                break;
            }
        }
    }
}

// ============================================================================
// UPLINK ENCODER
// ============================================================================

pub struct AudioUplinkEncoder {
    graph: Option<Box<dyn CaptureStream>>,
    blocks_encoded: u64,
}

impl AudioUplinkEncoder {
    /// Baut den Aufnahme-Graphen auf dem Mikrofon-Track auf
    pub fn connect(track: &dyn AudioTrack, events: EventSender) -> Result<Self, MediaError> {
        let mut chunker = BlockChunker::new(UPLINK_BLOCK_SIZE);
        let graph = track.open_stream(
            UPLINK_SAMPLE_RATE,
            Box::new(move |samples: &[f32]| {
                chunker.push(samples, |block| events.audio_block(block));
            }),
        )?;

        tracing::info!(
            "Audio uplink started: {} Hz, {} samples per block",
            UPLINK_SAMPLE_RATE,
            UPLINK_BLOCK_SIZE
        );

        Ok(Self {
            graph: Some(graph),
            blocks_encoded: 0,
        })
    }

    /// Kodiert einen Block als Audio-Nachricht
    pub fn encode(&mut self, block: &[f32]) -> OutboundMessage {
        self.blocks_encoded += 1;
        OutboundMessage::Audio(pcm16_to_bytes(&encode_pcm16(block)))
    }

    pub fn blocks_encoded(&self) -> u64 {
        self.blocks_encoded
    }

    pub fn is_connected(&self) -> bool {
        self.graph.is_some()
    }

    /// Trennt und schließt den Aufnahme-Graphen (idempotent)
    pub fn disconnect(&mut self) -> bool {
        match self.graph.take() {
            Some(mut graph) => {
                graph.close();
                tracing::info!("Audio uplink stopped after {} blocks", self.blocks_encoded);
                true
            }
            None => false,
        }
    }
}

impl Drop for AudioUplinkEncoder {
    fn drop(&mut self) {
        self.disconnect();
    }
}

// ============================================================================
// TESTS
// ============================================================================
