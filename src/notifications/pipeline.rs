//! Notification Pipeline
//!
//! Rollierendes Log (max. 20 Einträge, neueste zuerst) plus ein einzelner
//! Overlay-Slot, der den Inhalt Wort für Wort aufdeckt und sich danach
//! selbst ausblendet.
//!
//! Die Pipeline kennt keine Timer. Der Controller fragt [`NotificationPipeline::deadline`]
//! ab und ruft [`NotificationPipeline::advance`] auf, sobald sie erreicht ist.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Maximale Anzahl Einträge im Log
pub const LOG_CAPACITY: usize = 20;

/// Intervall zwischen zwei aufgedeckten Wörtern
pub const REVEAL_INTERVAL: Duration = Duration::from_millis(180);

/// Verweildauer nach vollständigem Aufdecken
pub const DISMISS_DELAY: Duration = Duration::from_millis(3000);

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Warning,
    #[default]
    Info,
}

impl Severity {
    /// Unbekannte Werte fallen auf `Info` zurück
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "success" => Severity::Success,
            "error" => Severity::Error,
            "warning" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

/// Noch nicht eingereihte Benachrichtigung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    pub title: String,
    pub content: String,
    pub severity: Severity,
    pub action: Option<String>,
}

impl NotificationDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            severity,
            action: None,
        }
    }
}

/// Eingereihte Benachrichtigung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub timestamp: String,
    pub title: String,
    pub content: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

/// Lesesicht auf das aktive Overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayView {
    pub notification_id: u64,
    pub title: String,
    pub severity: Severity,
    pub text: String,
    pub complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverlayPhase {
    Revealing,
    Lingering,
}

#[derive(Debug)]
struct Overlay {
    notification: Notification,
    words: Vec<String>,
    revealed: usize,
    text: String,
    phase: OverlayPhase,
    deadline: Instant,
}

impl Overlay {
    fn new(notification: Notification, now: Instant) -> Self {
        let words = notification
            .content
            .split_whitespace()
            .map(str::to_string)
            .collect();
        Self {
            notification,
            words,
            revealed: 0,
            text: String::new(),
            phase: OverlayPhase::Revealing,
            deadline: now + REVEAL_INTERVAL,
        }
    }

    fn view(&self) -> OverlayView {
        OverlayView {
            notification_id: self.notification.id,
            title: self.notification.title.clone(),
            severity: self.notification.severity,
            text: self.text.clone(),
            complete: self.phase == OverlayPhase::Lingering,
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

#[derive(Debug, Default)]
pub struct NotificationPipeline {
    log: VecDeque<Notification>,
    overlay: Option<Overlay>,
    next_id: u64,
}

impl NotificationPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reiht eine Benachrichtigung ein und ersetzt das aktive Overlay
    pub fn push(&mut self, draft: NotificationDraft, now: Instant) -> Notification {
        self.next_id += 1;
        let notification = Notification {
            id: self.next_id,
            timestamp: Local::now().format("%H:%M").to_string(),
            title: draft.title,
            content: draft.content,
            severity: draft.severity,
            action: draft.action,
        };

        tracing::debug!(
            "Notification #{} [{:?}] {}",
            notification.id,
            notification.severity,
            notification.title
        );

        self.log.push_front(notification.clone());
        self.log.truncate(LOG_CAPACITY);
        self.overlay = Some(Overlay::new(notification.clone(), now));

        notification
    }

    /// Nächster Zeitpunkt, zu dem das Overlay fortgeschrieben werden muss
    pub fn deadline(&self) -> Option<Instant> {
        self.overlay.as_ref().map(|o| o.deadline)
    }

    /// Schreibt das Overlay fort, falls seine Deadline erreicht ist
    ///
    /// Gibt `true` zurück, wenn sich das Overlay verändert hat.
    pub fn advance(&mut self, now: Instant) -> bool {
        let Some(overlay) = self.overlay.as_mut() else {
            return false;
        };
        if now < overlay.deadline {
            return false;
        }

        match overlay.phase {
            OverlayPhase::Revealing => {
                if let Some(word) = overlay.words.get(overlay.revealed) {
                    overlay.text.push_str(word);
                    overlay.text.push(' ');
                    overlay.revealed += 1;
                    overlay.deadline = now + REVEAL_INTERVAL;
                } else {
                    overlay.phase = OverlayPhase::Lingering;
                    overlay.deadline = now + DISMISS_DELAY;
                }
            }
            OverlayPhase::Lingering => {
                self.overlay = None;
            }
        }
        true
    }

    /// Blendet das Overlay sofort aus
    pub fn dismiss_overlay(&mut self) -> bool {
        self.overlay.take().is_some()
    }

    /// Entfernt einen Eintrag aus dem Log
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.log.len();
        self.log.retain(|n| n.id != id);
        if self.overlay.as_ref().map(|o| o.notification.id) == Some(id) {
            self.overlay = None;
        }
        self.log.len() != before
    }

    pub fn overlay(&self) -> Option<OverlayView> {
        self.overlay.as_ref().map(Overlay::view)
    }

    /// Log, neueste Einträge zuerst
    pub fn entries(&self) -> Vec<Notification> {
        self.log.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// "Titel: Inhalt" der neuesten Benachrichtigung
    pub fn summary(&self) -> Option<String> {
        self.log
            .front()
            .map(|n| format!("{}: {}", n.title, n.content))
    }
}

// ============================================================================
// TESTS
// ============================================================================
