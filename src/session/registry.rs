//! Session Registry - Handles pro Stream-ID
//!
//! Ersetzt einen globalen Singleton: die Registry lebt so lange wie ihr
//! Besitzer und beendet beim Herunterfahren alle Sessions.

use super::controller::ControllerSettings;
use super::handle::SessionHandle;
use crate::media::MediaBackend;
use crate::transport::Connector;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub struct SessionRegistry {
    settings: ControllerSettings,
    backend: Arc<dyn MediaBackend>,
    connector: Arc<dyn Connector>,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(
        settings: ControllerSettings,
        backend: Arc<dyn MediaBackend>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            settings,
            backend,
            connector,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Liefert das Handle für `stream_id` und startet bei Bedarf einen Controller
    pub fn get_or_spawn(&self, stream_id: &str) -> SessionHandle {
        if let Some(handle) = self.get(stream_id) {
            return handle;
        }

        let mut sessions = self.sessions.write();
        if let Some(handle) = sessions.get(stream_id).filter(|h| !h.is_closed()) {
            return handle.clone();
        }

        tracing::info!("Spawning session controller for stream {}", stream_id);
        let handle = SessionHandle::spawn(
            self.settings.clone(),
            Arc::clone(&self.backend),
            Arc::clone(&self.connector),
        );
        sessions.insert(stream_id.to_string(), handle.clone());
        handle
    }

    pub fn get(&self, stream_id: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .get(stream_id)
            .filter(|h| !h.is_closed())
            .cloned()
    }

    /// Entfernt das Handle und beendet die Session
    pub async fn remove(&self, stream_id: &str) -> bool {
        let Some(handle) = self.sessions.write().remove(stream_id) else {
            return false;
        };
        if let Err(e) = handle.stop().await {
            tracing::debug!("Session {} already closed: {}", stream_id, e);
        }
        true
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Beendet alle Sessions
    pub async fn shutdown(&self) {
        let handles: Vec<(String, SessionHandle)> = self.sessions.write().drain().collect();
        tracing::info!("Shutting down {} session(s)", handles.len());

        for (stream_id, handle) in handles {
            if let Err(e) = handle.stop().await {
                tracing::debug!("Session {} already closed: {}", stream_id, e);
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
