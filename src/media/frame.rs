//! Frame Encoder - periodische Standbilder der Kamera
//!
//! Pro Capture-Tick wird der aktuell neueste Frame als JPEG kodiert.
//! Es wird nichts zwischen zwei Ticks gepuffert.

use super::capture::{MediaError, VideoFrame, VideoTrack};
use crate::transport::OutboundMessage;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::time::Duration;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Standard-Intervall zwischen zwei Frames
pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_millis(100);

/// Standard JPEG-Qualität
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

// ============================================================================
// FRAME ENCODER
// ============================================================================

#[derive(Debug)]
pub struct FrameEncoder {
    quality: u8,
    frames_encoded: u64,
    ticks_skipped: u64,
}

impl FrameEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            frames_encoded: 0,
            ticks_skipped: 0,
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    pub fn ticks_skipped(&self) -> u64 {
        self.ticks_skipped
    }

    /// Kodiert einen Frame als JPEG
    pub fn encode(&self, frame: &VideoFrame) -> Result<Vec<u8>, MediaError> {
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.width == 0 || frame.height == 0 || frame.rgb.len() != expected {
            return Err(MediaError::Encode(format!(
                "invalid frame {}x{} with {} bytes",
                frame.width,
                frame.height,
                frame.rgb.len()
            )));
        }

        let mut jpeg = Vec::with_capacity(expected / 8);
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, self.quality);
        encoder
            .encode(&frame.rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
            .map_err(|e| MediaError::Encode(e.to_string()))?;

        Ok(jpeg)
    }

    /// Verarbeitet einen Capture-Tick
    ///
    /// Gibt `None` zurück, wenn die Quelle noch keinen Frame liefert oder
    /// das Kodieren fehlschlägt. Beides ist kein Fehler der Session.
    pub fn capture(&mut self, track: &dyn VideoTrack) -> Option<OutboundMessage> {
        let Some(frame) = track.latest_frame() else {
            self.ticks_skipped += 1;
            return None;
        };

        match self.encode(&frame) {
            Ok(jpeg) => {
                self.frames_encoded += 1;
                Some(OutboundMessage::Video(jpeg))
            }
            Err(e) => {
                tracing::debug!("Dropping video frame: {}", e);
                self.ticks_skipped += 1;
                None
            }
        }
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

// ============================================================================
// TESTS
// ============================================================================
