//! WebSocket Transport zum Streaming-Server
//!
//! Verwaltet genau eine Verbindung pro Session:
//! - Verbindungsaufbau in einem eigenen Task
//! - Serialisierung ausgehender Nachrichten
//! - Weiterleitung eingehender Frames an den Controller
//!
//! Der eigentliche Socket steckt hinter dem [`Link`]-Trait, damit der
//! Controller ohne Netzwerk getestet werden kann.

use super::messages::{InboundMessage, OutboundMessage, ProtocolError};
use crate::session::EventSender;
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Close-Code für ein reguläres Schließen
pub const NORMAL_CLOSE: u16 = 1000;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("WebSocket connection failed.")]
    OpenFailed(String),

    #[error("WebSocket connection failed.")]
    Failed(String),

    #[error("Connection was closed unexpectedly.")]
    UnexpectedClose { code: Option<u16> },

    #[error("Not connected to streaming server")]
    NotConnected,

    #[error("Failed to send message: {0}")]
    SendFailed(String),
}

impl TransportError {
    /// Technisches Detail hinter der Nutzer-Meldung
    pub fn detail(&self) -> Option<String> {
        match self {
            TransportError::OpenFailed(detail)
            | TransportError::Failed(detail)
            | TransportError::SendFailed(detail) => Some(detail.clone()),
            TransportError::UnexpectedClose { code } => {
                Some(format!("close code {}", code.map_or("none".to_string(), |c| c.to_string())))
            }
            TransportError::NotConnected => None,
        }
    }
}

// ============================================================================
// LINK ABSTRACTION
// ============================================================================

/// Events der rohen Verbindung
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Handshake abgeschlossen
    Opened,
    /// Text-Frame empfangen
    Text(String),
    /// Gegenseite hat geschlossen (`None` = ohne Close-Frame)
    Closed { code: Option<u16> },
    /// Verbindungsfehler
    Failed(String),
}

/// Rohe Duplex-Verbindung, die Text-Frames transportiert
pub trait Link: Send {
    fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Schließt die Verbindung mit Code 1000
    fn close(&mut self);
}

/// Baut Verbindungen zu einem Endpoint auf
///
/// `connect` kehrt sofort zurück. Das Ergebnis des Handshakes wird als
/// [`LinkEvent::Opened`] oder [`LinkEvent::Failed`] über `events` gemeldet.
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &str, events: EventSender) -> Box<dyn Link>;
}

// ============================================================================
// TRANSPORT CHANNEL
// ============================================================================

/// Framing-Schicht über einem [`Link`]
pub struct TransportChannel {
    link: Box<dyn Link>,
    is_open: bool,
    is_closed: bool,
    messages_sent: u64,
}

impl TransportChannel {
    /// Startet den Verbindungsaufbau
    pub fn connect(connector: &dyn Connector, endpoint: &str, events: EventSender) -> Self {
        tracing::info!("Connecting to streaming server: {}", endpoint);
        Self {
            link: connector.connect(endpoint, events),
            is_open: false,
            is_closed: false,
            messages_sent: 0,
        }
    }

    /// Markiert den Handshake als abgeschlossen
    pub fn mark_open(&mut self) {
        if !self.is_closed {
            self.is_open = true;
        }
    }

    pub fn is_open(&self) -> bool {
        self.is_open && !self.is_closed
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    /// Serialisiert und sendet eine Nachricht
    pub fn send(&mut self, message: &OutboundMessage) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotConnected);
        }

        let text = message
            .to_json()
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.link.send_text(text)?;
        self.messages_sent += 1;
        Ok(())
    }

    /// Schließt die Verbindung (idempotent)
    ///
    /// Gibt `true` zurück, wenn dieser Aufruf die Verbindung geschlossen hat.
    pub fn close(&mut self) -> bool {
        if self.is_closed {
            return false;
        }
        self.is_closed = true;
        self.is_open = false;
        self.link.close();
        tracing::info!("Transport closed after {} messages", self.messages_sent);
        true
    }

    /// Parst einen eingehenden Text-Frame
    pub fn decode(text: &str) -> Result<InboundMessage, ProtocolError> {
        InboundMessage::parse(text)
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TransportChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportChannel")
            .field("is_open", &self.is_open)
            .field("is_closed", &self.is_closed)
            .field("messages_sent", &self.messages_sent)
            .finish()
    }
}

// ============================================================================
// WEBSOCKET IMPLEMENTATION
// ============================================================================

enum LinkCommand {
    Send(String),
    Close,
}

/// Verbindungsaufbau über tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, endpoint: &str, events: EventSender) -> Box<dyn Link> {
        let (tx, mut rx) = mpsc::unbounded_channel::<LinkCommand>();
        let ws_url = endpoint.to_string();

        tokio::spawn(async move {
            let ws_stream = match connect_async(ws_url.as_str()).await {
                Ok((ws_stream, _)) => ws_stream,
                Err(e) => {
                    tracing::error!("WebSocket connection failed: {}", e);
                    events.link(LinkEvent::Failed(e.to_string()));
                    return;
                }
            };

            tracing::info!("WebSocket connected: {}", ws_url);
            events.link(LinkEvent::Opened);

            let (mut write, mut read) = ws_stream.split();

            loop {
                tokio::select! {
                    command = rx.recv() => match command {
                        Some(LinkCommand::Send(text)) => {
                            if let Err(e) = write.send(Message::Text(text)).await {
                                tracing::error!("Failed to send WebSocket message: {}", e);
                                events.link(LinkEvent::Failed(e.to_string()));
                                break;
                            }
                        }
                        Some(LinkCommand::Close) | None => {
                            let frame = CloseFrame {
                                code: CloseCode::Normal,
                                reason: Cow::Borrowed(""),
                            };
                            let _ = write.send(Message::Close(Some(frame))).await;
                            let _ = write.close().await;
                            break;
                        }
                    },
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => events.link(LinkEvent::Text(text)),
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.map(|f| u16::from(f.code));
                            tracing::info!("WebSocket closed by server (code {:?})", code);
                            events.link(LinkEvent::Closed { code });
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::error!("WebSocket error: {}", e);
                            events.link(LinkEvent::Failed(e.to_string()));
                            break;
                        }
                        None => {
                            events.link(LinkEvent::Closed { code: None });
                            break;
                        }
                    },
                }
            }
        });

        Box::new(WebSocketLink { tx })
    }
}

struct WebSocketLink {
    tx: mpsc::UnboundedSender<LinkCommand>,
}

impl Link for WebSocketLink {
    fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.tx
            .send(LinkCommand::Send(text))
            .map_err(|_| TransportError::NotConnected)
    }

    fn close(&mut self) {
        let _ = self.tx.send(LinkCommand::Close);
    }
}

// ============================================================================
// TESTS
// ============================================================================
