//! Audio Playback Scheduler
//!
//! Spielt eingehende PCM16-Chunks strikt nacheinander ab. Es ist immer
//! höchstens ein Chunk im Wiedergabe-Kontext; der nächste wird erst nach
//! dem Ende-Signal des laufenden gestartet.

use super::capture::MediaError;
use super::pcm::{bytes_to_pcm16, decode_pcm16, PcmError};
use crate::session::EventSender;
use std::collections::VecDeque;

/// Wird aufgerufen, sobald ein Chunk vollständig abgespielt ist
pub type EndedCallback = Box<dyn FnOnce() + Send + 'static>;

/// Wiedergabe-Kontext mit fester Sample-Rate
pub trait PlaybackContext: Send {
    /// Spielt einen Chunk ab; `on_ended` wird genau einmal nach dem Ende aufgerufen
    fn play(&mut self, samples: Vec<f32>, on_ended: EndedCallback) -> Result<(), MediaError>;

    /// Schließt den Kontext, laufende Wiedergabe wird verworfen
    fn close(&mut self);
}

// ============================================================================
// SCHEDULER
// ============================================================================

#[derive(Default)]
pub struct AudioPlaybackScheduler {
    context: Option<Box<dyn PlaybackContext>>,
    queue: VecDeque<Vec<i16>>,
    current: Option<u64>,
    next_chunk: u64,
    played: u64,
    dropped: u64,
}

impl AudioPlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Übernimmt einen geöffneten Wiedergabe-Kontext
    pub fn attach(&mut self, context: Box<dyn PlaybackContext>) {
        if let Some(mut old) = self.context.replace(context) {
            old.close();
        }
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    /// Reiht einen dekodierten Chunk ein und startet ihn, falls nichts läuft
    pub fn enqueue(&mut self, bytes: &[u8], events: &EventSender) -> Result<(), PcmError> {
        let pcm = bytes_to_pcm16(bytes)?;

        if self.context.is_none() {
            tracing::warn!("No playback context, dropping {} samples", pcm.len());
            self.dropped += 1;
            return Ok(());
        }

        self.queue.push_back(pcm);
        if self.current.is_none() {
            self.play_next(events);
        }
        Ok(())
    }

    /// Ende-Signal eines Chunks; veraltete Chunk-IDs werden ignoriert
    pub fn on_ended(&mut self, chunk: u64, events: &EventSender) -> bool {
        if self.current != Some(chunk) {
            tracing::debug!("Ignoring stale playback completion for chunk {}", chunk);
            return false;
        }
        self.current = None;
        self.play_next(events);
        true
    }

    fn play_next(&mut self, events: &EventSender) {
        let Some(context) = self.context.as_mut() else {
            return;
        };

        while let Some(pcm) = self.queue.pop_front() {
            let chunk = self.next_chunk;
            self.next_chunk += 1;

            let sender = events.clone();
            match context.play(
                decode_pcm16(&pcm),
                Box::new(move || sender.playback_ended(chunk)),
            ) {
                Ok(()) => {
                    self.current = Some(chunk);
                    self.played += 1;
                    return;
                }
                Err(e) => {
                    tracing::warn!("Skipping audio chunk {}: {}", chunk, e.detail());
                    self.dropped += 1;
                }
            }
        }
    }

    /// Verwirft Warteschlange und laufenden Chunk
    pub fn clear(&mut self) {
        self.queue.clear();
        self.current = None;
    }

    /// Schließt den Wiedergabe-Kontext (idempotent)
    pub fn close_context(&mut self) -> bool {
        match self.context.take() {
            Some(mut context) => {
                context.close();
                tracing::info!("Playback context closed after {} chunks", self.played);
                true
            }
            None => false,
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }

    pub fn played(&self) -> u64 {
        self.played
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Drop for AudioPlaybackScheduler {
    fn drop(&mut self) {
        self.clear();
        self.close_context();
    }
}

// ============================================================================
// TESTS
// ============================================================================
