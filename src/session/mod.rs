//! Session Module - Lebenszyklus einer Live-Session
//!
//! Dieses Modul verwaltet:
//! - Die Zustandsmaschine (Idle → Connecting → Live → Stopping → Idle)
//! - Den Controller-Task, der alle Events serialisiert
//! - Handles und Registry für die Präsentationsschicht

mod controller;
mod events;
mod handle;
mod registry;
mod state;

pub use controller::{ControllerSettings, SessionController};
pub use events::{ControllerEvent, EventSender, SessionEvent};
pub use handle::{Command, SessionHandle};
pub use registry::SessionRegistry;
pub use state::{ErrorKind, Session, SessionError, SessionState, SessionStats, SessionView};
