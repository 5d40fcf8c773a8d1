//! Media Capture - Kamera und Mikrofon
//!
//! Der [`MediaCaptureManager`] fordert die Geräte an, hält die
//! [`MediaResource`] exklusiv und gibt sie genau einmal wieder frei.
//! Die Encoder bekommen nur lesenden Zugriff auf die Tracks.

use super::playback::PlaybackContext;
use crate::config::{AudioConstraints, SessionConfig, VideoConstraints};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Permission denied. Please allow camera/mic access.")]
    PermissionDenied(String),

    #[error("No camera or microphone found.")]
    DeviceNotFound(String),

    #[error("Unable to access camera/microphone. {0}")]
    Acquisition(String),

    #[error("Audio setup failed. Check microphone permission or device.")]
    AudioSetup(String),

    #[error("Failed to encode frame: {0}")]
    Encode(String),
}

impl MediaError {
    /// Technisches Detail hinter der Nutzer-Meldung
    pub fn detail(&self) -> &str {
        match self {
            MediaError::PermissionDenied(d)
            | MediaError::DeviceNotFound(d)
            | MediaError::Acquisition(d)
            | MediaError::AudioSetup(d)
            | MediaError::Encode(d) => d,
        }
    }
}

/// Ordnet eine Fehlermeldung eines Geräte-Backends einer Fehlerart zu
pub fn classify_device_error(message: &str) -> MediaError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        MediaError::PermissionDenied(message.to_string())
    } else if lower.contains("not found")
        || lower.contains("no device")
        || lower.contains("no such")
        || lower.contains("not available")
    {
        MediaError::DeviceNotFound(message.to_string())
    } else {
        MediaError::Acquisition(message.to_string())
    }
}

// ============================================================================
// TRACKS
// ============================================================================

/// Dekodierter Kamera-Frame (RGB8, zeilenweise)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// Callback für aufgenommene Samples (mono, Ziel-Sample-Rate)
pub type SampleCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Laufende Kamera
pub trait VideoTrack: Send + Sync {
    fn label(&self) -> String;

    /// Letzter verfügbarer Frame, `None` solange die Quelle nicht bereit ist
    fn latest_frame(&self) -> Option<VideoFrame>;

    fn stop(&mut self);
}

/// Angefordertes Mikrofon
pub trait AudioTrack: Send + Sync {
    fn label(&self) -> String;

    /// Baut den Aufnahme-Graphen auf; `on_samples` läuft im Audio-Thread
    fn open_stream(
        &self,
        sample_rate: u32,
        on_samples: SampleCallback,
    ) -> Result<Box<dyn CaptureStream>, MediaError>;

    fn stop(&mut self);
}

/// Aktiver Aufnahme-Graph
pub trait CaptureStream: Send {
    fn close(&mut self);
}

// ============================================================================
// BACKEND
// ============================================================================

/// Geräte-Anforderung, abgeleitet aus der Session-Konfiguration
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub video: Option<VideoConstraints>,
    pub audio: Option<AudioConstraints>,
}

impl CaptureRequest {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            video: config
                .video_enabled
                .then(|| config.video_constraints.clone()),
            audio: config
                .audio_enabled
                .then(|| config.audio_constraints.clone()),
        }
    }
}

/// Zugang zu Aufnahme- und Wiedergabe-Geräten
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Fordert alle Geräte der Anfrage an (alles oder nichts)
    async fn acquire(&self, request: CaptureRequest) -> Result<MediaResource, MediaError>;

    /// Öffnet einen Wiedergabe-Kontext mit fester Sample-Rate
    fn open_playback(&self, sample_rate: u32) -> Result<Box<dyn PlaybackContext>, MediaError>;
}

/// Angeforderte Kamera- und Mikrofon-Tracks
pub struct MediaResource {
    video: Option<Box<dyn VideoTrack>>,
    audio: Option<Box<dyn AudioTrack>>,
}

impl MediaResource {
    pub fn new(video: Option<Box<dyn VideoTrack>>, audio: Option<Box<dyn AudioTrack>>) -> Self {
        Self { video, audio }
    }

    fn stop_tracks(&mut self) {
        if let Some(video) = self.video.as_mut() {
            tracing::debug!("Stopping video track: {}", video.label());
            video.stop();
        }
        if let Some(audio) = self.audio.as_mut() {
            tracing::debug!("Stopping audio track: {}", audio.label());
            audio.stop();
        }
    }
}

impl std::fmt::Debug for MediaResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaResource")
            .field("video", &self.video.as_ref().map(|v| v.label()))
            .field("audio", &self.audio.as_ref().map(|a| a.label()))
            .finish()
    }
}

// ============================================================================
// CAPTURE MANAGER
// ============================================================================

pub struct MediaCaptureManager {
    backend: Arc<dyn MediaBackend>,
    resource: Option<MediaResource>,
}

impl MediaCaptureManager {
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend,
            resource: None,
        }
    }

    pub fn backend(&self) -> &Arc<dyn MediaBackend> {
        &self.backend
    }

    /// Fordert Kamera und/oder Mikrofon an
    pub async fn acquire(&mut self, request: CaptureRequest) -> Result<(), MediaError> {
        if self.resource.is_some() {
            return Err(MediaError::Acquisition(
                "media resource already acquired".to_string(),
            ));
        }

        let wants_video = request.video.is_some();
        let wants_audio = request.audio.is_some();
        let mut resource = self.backend.acquire(request).await?;

        if (wants_video && resource.video.is_none()) || (wants_audio && resource.audio.is_none()) {
            resource.stop_tracks();
            return Err(MediaError::DeviceNotFound(
                "backend returned fewer tracks than requested".to_string(),
            ));
        }

        tracing::info!("Media acquired: {:?}", resource);
        self.resource = Some(resource);
        Ok(())
    }

    pub fn is_acquired(&self) -> bool {
        self.resource.is_some()
    }

    pub fn video(&self) -> Option<&dyn VideoTrack> {
        self.resource.as_ref().and_then(|r| r.video.as_deref())
    }

    pub fn audio(&self) -> Option<&dyn AudioTrack> {
        self.resource.as_ref().and_then(|r| r.audio.as_deref())
    }

    /// Stoppt alle Tracks und gibt die Ressource frei
    ///
    /// Gibt `true` zurück, wenn tatsächlich etwas freigegeben wurde.
    pub fn release(&mut self) -> bool {
        match self.resource.take() {
            Some(mut resource) => {
                resource.stop_tracks();
                tracing::info!("Media resource released");
                true
            }
            None => false,
        }
    }
}

impl Drop for MediaCaptureManager {
    fn drop(&mut self) {
        self.release();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;

    fn both() -> CaptureRequest {
        CaptureRequest::from_config(&SessionConfig::default())
    }

    #[tokio::test]
    async fn test_acquire_and_release_once() {
        let backend = MockBackend::new();
        let probe = backend.probe();
        let mut manager = MediaCaptureManager::new(Arc::new(backend));

        manager.acquire(both()).await.unwrap();
        assert!(manager.video().is_some());
        assert!(manager.audio().is_some());
        assert_eq!(probe.acquisitions(), 1);

        assert!(manager.release());
        assert!(!manager.release());
        drop(manager);

        assert_eq!(probe.video_stops(), 1);
        assert_eq!(probe.audio_stops(), 1);
    }

    #[tokio::test]
    async fn test_audio_only_request() {
        let backend = MockBackend::new();
        let mut manager = MediaCaptureManager::new(Arc::new(backend));
        let config = SessionConfig {
            video_enabled: false,
            ..SessionConfig::default()
        };

        manager
            .acquire(CaptureRequest::from_config(&config))
            .await
            .unwrap();
        assert!(manager.video().is_none());
        assert!(manager.audio().is_some());
    }

    #[tokio::test]
    async fn test_acquire_failure_keeps_nothing() {
        let backend = MockBackend::new();
        backend.fail_acquire(MediaError::PermissionDenied("NotAllowedError".into()));
        let mut manager = MediaCaptureManager::new(Arc::new(backend));

        let err = manager.acquire(both()).await.unwrap_err();
        assert!(matches!(err, MediaError::PermissionDenied(_)));
        assert!(!manager.is_acquired());
    }

    #[tokio::test]
    async fn test_second_acquire_rejected() {
        let backend = MockBackend::new();
        let probe = backend.probe();
        let mut manager = MediaCaptureManager::new(Arc::new(backend));

        manager.acquire(both()).await.unwrap();
        assert!(manager.acquire(both()).await.is_err());
        assert_eq!(probe.acquisitions(), 1);
    }

    #[test]
    fn test_classify_device_error() {
        assert!(matches!(
            classify_device_error("Permission denied by user"),
            MediaError::PermissionDenied(_)
        ));
        assert!(matches!(
            classify_device_error("Device not found: /dev/video0"),
            MediaError::DeviceNotFound(_)
        ));
        assert!(matches!(
            classify_device_error("backend exploded"),
            MediaError::Acquisition(_)
        ));
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            MediaError::PermissionDenied("x".into()).to_string(),
            "Permission denied. Please allow camera/mic access."
        );
        assert_eq!(
            MediaError::Acquisition("busy".into()).to_string(),
            "Unable to access camera/microphone. busy"
        );
    }
}
