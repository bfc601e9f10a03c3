//! Processed external events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marker that a provider event id has been applied.
///
/// Written in the same atomic unit as the event's effects and never
/// overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    /// Provider event id (`evt_...`).
    pub event_id: String,
    /// Provider event type, e.g. `checkout.session.completed`.
    pub event_type: String,
    /// When the event was applied.
    pub processed_at: DateTime<Utc>,
}

impl ProcessedEvent {
    /// Mark `event_id` as processed now.
    #[must_use]
    pub fn now(event_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            processed_at: Utc::now(),
        }
    }
}
