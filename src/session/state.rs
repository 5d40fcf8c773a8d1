//! Session-Zustand, Fehler und Lesemodell

use crate::config::ConfigError;
use crate::media::MediaError;
use crate::notifications::{Notification, OverlayView};
use crate::transport::{ProtocolError, TransportError};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Live,
    Stopping,
    Error,
}

impl SessionState {
    /// Eine Session existiert (Ressourcen können gehalten werden)
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Live => "live",
            SessionState::Stopping => "stopping",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Fehlerarten, unabhängig vom Modul, aus dem der Fehler stammt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Permission,
    DeviceNotFound,
    Acquisition,
    Config,
    TransportOpen,
    Transport,
    UnexpectedClose,
    AudioSetup,
    ProtocolParse,
    AlreadyActive,
    Closed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("A session is already {0}")]
    AlreadyActive(SessionState),

    #[error("Session controller is no longer running")]
    Closed,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Config(_) => ErrorKind::Config,
            SessionError::Media(e) => match e {
                MediaError::PermissionDenied(_) => ErrorKind::Permission,
                MediaError::DeviceNotFound(_) => ErrorKind::DeviceNotFound,
                MediaError::Acquisition(_) => ErrorKind::Acquisition,
                MediaError::AudioSetup(_) | MediaError::Encode(_) => ErrorKind::AudioSetup,
            },
            SessionError::Transport(e) => match e {
                TransportError::OpenFailed(_) => ErrorKind::TransportOpen,
                TransportError::UnexpectedClose { .. } => ErrorKind::UnexpectedClose,
                TransportError::Failed(_)
                | TransportError::NotConnected
                | TransportError::SendFailed(_) => ErrorKind::Transport,
            },
            SessionError::Protocol(_) => ErrorKind::ProtocolParse,
            SessionError::AlreadyActive(_) => ErrorKind::AlreadyActive,
            SessionError::Closed => ErrorKind::Closed,
        }
    }
}

// ============================================================================
// READ MODEL
// ============================================================================

/// Momentaufnahme der Session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub id: Option<Uuid>,
    pub state: SessionState,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub viewer_count: u32,
    pub last_error: Option<SessionError>,
}

/// Zähler für die laufende Session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub video_frames_sent: u64,
    pub audio_blocks_sent: u64,
    pub audio_chunks_played: u64,
    pub messages_dropped: u64,
}

/// Alles, was die Präsentationsschicht anzeigen muss
#[derive(Debug, Clone, Default)]
pub struct SessionView {
    pub session: Session,
    pub notifications: Vec<Notification>,
    pub overlay: Option<OverlayView>,
    pub summary: Option<String>,
    pub error_notice: Option<String>,
    pub transcript: String,
    pub stats: SessionStats,
}

impl SessionView {
    /// Platzhalter-Text, solange kein Stream läuft
    pub fn offline_message(&self) -> Option<String> {
        if self.session.state == SessionState::Live {
            return None;
        }
        Some(
            self.session
                .last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Stream offline".to_string()),
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
