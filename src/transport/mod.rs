//! Transport Module - WebSocket Client für den Streaming-Server
//!
//! Dieses Modul verwaltet die Kommunikation mit dem Server:
//! - WebSocket-Verbindung aufbauen und schließen
//! - Ausgehende Medien-Nachrichten serialisieren
//! - Eingehende Nachrichten parsen und weiterleiten

mod channel;
mod messages;

pub use channel::{
    Connector, Link, LinkEvent, TransportChannel, TransportError, WebSocketConnector, NORMAL_CLOSE,
};
pub use messages::{InboundMessage, OutboundMessage, ProtocolError};
