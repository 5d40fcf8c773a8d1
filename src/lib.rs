//! Live Stream - Live-Medien-Session gegen einen Streaming-Server
//!
//! Eine Engine für bidirektionale Live-Sessions mit:
//! - Kamera-Frames als JPEG im festen Takt
//! - Mikrofon-Audio als PCM16 in festen Blöcken
//! - Sequentieller Wiedergabe der Server-Antworten
//! - Benachrichtigungen mit animiertem Overlay

pub mod config;
pub mod media;
pub mod notifications;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::Context;
use config::AppConfig;
use media::DeviceBackend;
use session::{ControllerSettings, SessionEvent, SessionRegistry, SessionState};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use transport::WebSocketConnector;

/// Standard-Filter, falls `RUST_LOG` nicht gesetzt ist
const DEFAULT_LOG_FILTER: &str = "live_stream_lib=debug,tokio_tungstenite=warn";

/// Stream-ID der Session, die das Binary startet
const DEFAULT_STREAM_ID: &str = "default";

// ============================================================================
// LOGGING
// ============================================================================

/// Initialisiert das Logging (mehrfacher Aufruf ist unschädlich)
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// ============================================================================
// APP RUNNER
// ============================================================================

/// Startet eine Session mit der geladenen Konfiguration und wartet auf ihr Ende
pub fn run() -> anyhow::Result<()> {
    init_logging();
    tracing::info!("Initializing Live Stream...");

    let config = AppConfig::load().context("Failed to load configuration")?;
    tracing::info!("Streaming endpoint: {}", config.endpoint);

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    runtime.block_on(stream(config))
}

async fn stream(config: AppConfig) -> anyhow::Result<()> {
    let registry = SessionRegistry::new(
        ControllerSettings::from(&config),
        Arc::new(DeviceBackend),
        Arc::new(WebSocketConnector),
    );

    let handle = registry.get_or_spawn(DEFAULT_STREAM_ID);
    let mut events = handle.subscribe();

    handle
        .start(config.session.clone())
        .await
        .context("Failed to start stream")?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Interrupted, stopping stream");
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::StateChanged(SessionState::Idle)) => break,
                Ok(SessionEvent::StateChanged(state)) => {
                    tracing::info!("Stream is {}", state);
                }
                Ok(SessionEvent::NotificationAdded(n)) => {
                    tracing::info!("[{:?}] {}: {}", n.severity, n.title, n.content);
                }
                Ok(SessionEvent::ErrorNotice(message)) => {
                    tracing::warn!("Server error: {}", message);
                }
                Ok(SessionEvent::TranscriptUpdated(transcript)) => {
                    tracing::debug!("Transcript: {}", transcript);
                }
                Ok(SessionEvent::OverlayUpdated(_)) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event bus lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    registry.shutdown().await;

    let view = handle.snapshot();
    if let Some(error) = &view.session.last_error {
        tracing::warn!("Stream ended with error: {}", error);
    }
    tracing::info!(
        "Stream finished: {} video frames, {} audio blocks sent, {} chunks played, {} messages dropped",
        view.stats.video_frames_sent,
        view.stats.audio_blocks_sent,
        view.stats.audio_chunks_played,
        view.stats.messages_dropped
    );

    Ok(())
}
