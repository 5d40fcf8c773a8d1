//! PCM Hilfsfunktionen
//!
//! Konvertierung zwischen Float-Samples und 16-Bit PCM, Byte-Layout für
//! den Transport sowie einfaches Resampling und Downmix.

use thiserror::Error;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Sample Rate für das Uplink-Audio (Mikrofon → Server)
pub const UPLINK_SAMPLE_RATE: u32 = 16000;

/// Sample Rate für das Downlink-Audio (Server → Lautsprecher)
pub const DOWNLINK_SAMPLE_RATE: u32 = 24000;

/// Block-Größe des Uplinks in Samples (4096 @ 16kHz ≈ 256ms)
pub const UPLINK_BLOCK_SIZE: usize = 4096;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PcmError {
    #[error("PCM16 payload has odd length: {0} bytes")]
    OddLength(usize),
}

// ============================================================================
// CONVERSION
// ============================================================================

/// Konvertiert ein Float-Sample nach PCM16
///
/// Das Sample wird auf [-1, 1] geklemmt. Negative Werte werden mit 32768,
/// positive mit 32767 skaliert, damit beide Enden des i16-Bereichs exakt
/// erreicht werden.
#[inline]
pub fn float_to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Konvertiert einen ganzen Block Float-Samples nach PCM16
pub fn encode_pcm16(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|s| float_to_pcm16(*s)).collect()
}

/// Normalisiert ein PCM16-Sample auf Float
#[inline]
pub fn pcm16_to_float(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Normalisiert einen ganzen PCM16-Block auf Float
pub fn decode_pcm16(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|s| pcm16_to_float(*s)).collect()
}

/// Serialisiert PCM16 als Little-Endian Bytes
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Liest PCM16 aus Little-Endian Bytes
pub fn bytes_to_pcm16(bytes: &[u8]) -> Result<Vec<i16>, PcmError> {
    if bytes.len() % 2 != 0 {
        return Err(PcmError::OddLength(bytes.len()));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

// ============================================================================
// RESAMPLING
// ============================================================================

/// Einfaches Linear-Resampling von `source_rate` auf `target_rate`
pub fn resample_linear(data: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || data.is_empty() {
        return data.to_vec();
    }

    let ratio = target_rate as f32 / source_rate as f32;
    let new_len = (data.len() as f32 * ratio) as usize;
    (0..new_len)
        .map(|i| {
            let src_idx = i as f32 / ratio;
            let idx = src_idx as usize;
            let frac = src_idx - idx as f32;
            let s1 = data.get(idx).copied().unwrap_or(0.0);
            let s2 = data.get(idx + 1).copied().unwrap_or(s1);
            s1 + (s2 - s1) * frac
        })
        .collect()
}

/// Nimmt aus interleaved Audio nur den ersten Kanal
pub fn first_channel(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.iter().step_by(channels).copied().collect()
}

// ============================================================================
// TESTS
// ============================================================================
