//! Notifications Module - Log und animiertes Overlay

mod pipeline;

pub use pipeline::{
    Notification, NotificationDraft, NotificationPipeline, OverlayView, Severity, DISMISS_DELAY,
    LOG_CAPACITY, REVEAL_INTERVAL,
};
