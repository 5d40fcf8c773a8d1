//! Events für den Controller-Task und den Event-Bus
//!
//! Alle Quellen (WebSocket-Task, Audio-Callback, Playback-Ende) schreiben
//! ausschließlich über einen [`EventSender`] in den Controller. Jedes Event
//! trägt die Session-ID, damit verspätete Events einer bereits beendeten
//! Session verworfen werden können.

use crate::notifications::{Notification, OverlayView};
use crate::transport::LinkEvent;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::state::SessionState;

// ============================================================================
// CONTROLLER EVENTS
// ============================================================================

/// Interne Events, die vom Controller-Task serialisiert verarbeitet werden
#[derive(Debug)]
pub enum ControllerEvent {
    /// Event der Transport-Verbindung
    Link { session: Uuid, event: LinkEvent },

    /// Ein kompletter Mikrofon-Block (16kHz, Float)
    AudioBlock { session: Uuid, samples: Vec<f32> },

    /// Wiedergabe eines Chunks ist beendet
    PlaybackEnded { session: Uuid, chunk: u64 },
}

impl ControllerEvent {
    /// Session, zu der das Event gehört
    pub fn session(&self) -> Uuid {
        match self {
            ControllerEvent::Link { session, .. }
            | ControllerEvent::AudioBlock { session, .. }
            | ControllerEvent::PlaybackEnded { session, .. } => *session,
        }
    }
}

/// Sender, der Events einer bestimmten Session in den Controller schreibt
///
/// `UnboundedSender::send` blockiert nie und kann daher direkt aus
/// Hardware-Callbacks aufgerufen werden.
#[derive(Debug, Clone)]
pub struct EventSender {
    session: Uuid,
    tx: mpsc::UnboundedSender<ControllerEvent>,
}

impl EventSender {
    pub fn new(session: Uuid, tx: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    /// Meldet ein Event der Transport-Verbindung
    pub fn link(&self, event: LinkEvent) {
        let _ = self.tx.send(ControllerEvent::Link {
            session: self.session,
            event,
        });
    }

    /// Meldet einen fertigen Mikrofon-Block
    pub fn audio_block(&self, samples: Vec<f32>) {
        let _ = self.tx.send(ControllerEvent::AudioBlock {
            session: self.session,
            samples,
        });
    }

    /// Meldet das Ende eines Playback-Chunks
    pub fn playback_ended(&self, chunk: u64) {
        let _ = self.tx.send(ControllerEvent::PlaybackEnded {
            session: self.session,
            chunk,
        });
    }
}

// ============================================================================
// SESSION EVENTS
// ============================================================================

/// Events für die Präsentationsschicht (Broadcast)
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionState),
    NotificationAdded(Notification),
    OverlayUpdated(Option<OverlayView>),
    ErrorNotice(String),
    TranscriptUpdated(String),
}
