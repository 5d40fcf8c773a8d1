//! Session Handle - Zugriff auf einen laufenden Controller-Task
//!
//! Das Handle ist klonbar. Befehle gehen über einen Channel an den
//! Controller, Lesezugriffe laufen direkt auf dem geteilten Lesemodell.

use super::controller::{ControllerSettings, SessionController};
use super::events::SessionEvent;
use super::state::{SessionError, SessionState, SessionView};
use crate::config::SessionConfig;
use crate::media::MediaBackend;
use crate::transport::Connector;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Kapazität des Befehls-Channels
const COMMAND_CAPACITY: usize = 32;

/// Befehle an den Controller-Task
#[derive(Debug)]
pub enum Command {
    Start {
        config: SessionConfig,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Stop {
        reply: oneshot::Sender<bool>,
    },
    DismissNotification(u64),
    DismissOverlay,
    SetViewerCount(u32),
}

#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    view: Arc<RwLock<SessionView>>,
    bus: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Startet einen Controller-Task und gibt das Handle darauf zurück
    pub fn spawn(
        settings: ControllerSettings,
        backend: Arc<dyn MediaBackend>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let controller = SessionController::new(settings, backend, connector);
        let (commands, rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = Self {
            commands,
            view: controller.view(),
            bus: controller.bus(),
        };

        tokio::spawn(controller.run(rx));
        handle
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    async fn command(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Startet eine Session mit der gegebenen Konfiguration
    pub async fn start(&self, config: SessionConfig) -> Result<(), SessionError> {
        self.request(|reply| Command::Start { config, reply }).await?
    }

    /// Beendet die laufende Session
    pub async fn stop(&self) -> Result<bool, SessionError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn dismiss_notification(&self, id: u64) -> Result<(), SessionError> {
        self.command(Command::DismissNotification(id)).await
    }

    pub async fn dismiss_overlay(&self) -> Result<(), SessionError> {
        self.command(Command::DismissOverlay).await
    }

    pub async fn set_viewer_count(&self, count: u32) -> Result<(), SessionError> {
        self.command(Command::SetViewerCount(count)).await
    }

    /// Kopie des aktuellen Lesemodells
    pub fn snapshot(&self) -> SessionView {
        self.view.read().clone()
    }

    pub fn state(&self) -> SessionState {
        self.view.read().session.state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.bus.subscribe()
    }

    /// `true`, wenn der Controller-Task beendet ist
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
