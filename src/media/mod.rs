//! Media Module - Aufnahme, Kodierung und Wiedergabe
//!
//! Dieses Modul enthält:
//! - Geräte-Anforderung und Freigabe (Kamera, Mikrofon)
//! - JPEG-Kodierung der Kamera-Frames
//! - PCM16-Uplink in festen Blöcken
//! - Sequentielle Wiedergabe eingehender Audio-Chunks

mod capture;
mod devices;
mod frame;
pub mod pcm;
mod playback;
mod uplink;

pub use capture::{
    classify_device_error, AudioTrack, CaptureRequest, CaptureStream, MediaBackend,
    MediaCaptureManager, MediaError, MediaResource, SampleCallback, VideoFrame, VideoTrack,
};
pub use devices::{CpalMicrophone, CpalPlayback, DeviceBackend};
pub use frame::{FrameEncoder, DEFAULT_CAPTURE_INTERVAL, DEFAULT_JPEG_QUALITY};
pub use playback::{AudioPlaybackScheduler, EndedCallback, PlaybackContext};
pub use uplink::{AudioUplinkEncoder, BlockChunker};
