//! Message Types für das Streaming-Protokoll
//!
//! Beide Richtungen verwenden einen flachen JSON-Umschlag mit einem
//! `type`-Diskriminator. Binäre Nutzdaten (JPEG, PCM16) werden als
//! Base64 übertragen.

use crate::notifications::{NotificationDraft, Severity};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Unrecognized message type: {0}")]
    UnknownType(String),

    #[error("Invalid payload for '{kind}': {reason}")]
    InvalidPayload { kind: &'static str, reason: String },
}

// ============================================================================
// CLIENT → SERVER MESSAGES
// ============================================================================

/// Ausgehende Medien-Nachricht
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// JPEG-kodierter Kamera-Frame
    Video(Vec<u8>),
    /// PCM16 Little-Endian Block @ 16kHz
    Audio(Vec<u8>),
}

/// Wire-Format einer ausgehenden Nachricht
#[derive(Debug, Clone, Serialize)]
struct OutboundEnvelope<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    data: &'a str,
}

impl OutboundMessage {
    /// Typ-Diskriminator auf dem Draht
    pub fn msg_type(&self) -> &'static str {
        match self {
            OutboundMessage::Video(_) => "video",
            OutboundMessage::Audio(_) => "audio",
        }
    }

    /// Rohdaten der Nachricht
    pub fn payload(&self) -> &[u8] {
        match self {
            OutboundMessage::Video(bytes) | OutboundMessage::Audio(bytes) => bytes,
        }
    }

    /// Serialisiert die Nachricht als JSON-Text
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let data = BASE64.encode(self.payload());
        serde_json::to_string(&OutboundEnvelope {
            msg_type: self.msg_type(),
            data: &data,
        })
        .map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

// ============================================================================
// SERVER → CLIENT MESSAGES
// ============================================================================

/// Eingehende Nachricht nach dem Parsen
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// PCM16 Little-Endian Chunk @ 24kHz (bereits Base64-dekodiert)
    AudioChunk(Vec<u8>),

    /// Benachrichtigung vom Server
    Notification(NotificationDraft),

    /// Fehlermeldung vom Server (nicht fatal)
    Error { message: String },

    /// Text-Fragment einer laufenden Antwort
    Text(String),
}

/// Flacher Umschlag für eingehende Nachrichten
///
/// Alle Felder sind optional, damit fehlende Felder erst bei der
/// Typ-Zuordnung bewertet werden.
#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    #[serde(rename = "type")]
    msg_type: Option<String>,
    data: Option<serde_json::Value>,
    title: Option<String>,
    content: Option<String>,
    severity: Option<String>,
    error: Option<String>,
    action: Option<String>,
}

impl InboundEnvelope {
    fn data_str(&self) -> Option<&str> {
        self.data.as_ref().and_then(|v| v.as_str())
    }
}

impl InboundMessage {
    /// Parst einen JSON-Text-Frame
    ///
    /// Unbekannte Typen werden als [`ProtocolError::UnknownType`] gemeldet,
    /// auch wenn sie ein `data`-Feld tragen.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: InboundEnvelope =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        match envelope.msg_type.as_deref() {
            Some("audio") => {
                let data = envelope
                    .data_str()
                    .ok_or_else(|| ProtocolError::InvalidPayload {
                        kind: "audio",
                        reason: "missing data".to_string(),
                    })?;
                let bytes = BASE64
                    .decode(data)
                    .map_err(|e| ProtocolError::InvalidPayload {
                        kind: "audio",
                        reason: e.to_string(),
                    })?;
                Ok(InboundMessage::AudioChunk(bytes))
            }

            Some("notification") => {
                let content = envelope
                    .content
                    .clone()
                    .or_else(|| envelope.data_str().map(str::to_string))
                    .unwrap_or_default();
                Ok(InboundMessage::Notification(NotificationDraft {
                    title: envelope.title.unwrap_or_else(|| "Update".to_string()),
                    content,
                    severity: envelope
                        .severity
                        .as_deref()
                        .map(Severity::parse)
                        .unwrap_or_default(),
                    action: envelope.action,
                }))
            }

            Some("error") => Ok(InboundMessage::Error {
                message: envelope.error.unwrap_or_else(|| "Server error".to_string()),
            }),

            Some("text") => {
                let data = envelope
                    .data_str()
                    .ok_or_else(|| ProtocolError::InvalidPayload {
                        kind: "text",
                        reason: "missing data".to_string(),
                    })?;
                Ok(InboundMessage::Text(data.to_string()))
            }

            Some(other) => Err(ProtocolError::UnknownType(other.to_string())),
            None => Err(ProtocolError::UnknownType("<missing>".to_string())),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
