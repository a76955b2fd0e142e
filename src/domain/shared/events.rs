//! Domain event plumbing shared by the aggregates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Implemented by every event an aggregate records
pub trait DomainEvent: Send + Sync {
    /// Dotted name such as `call.started`
    fn event_type(&self) -> &'static str;

    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Identity and timestamp stamped on a recorded event.
///
/// `occurred_at` comes from the caller's clock, never from `Utc::now()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
}

impl EventMetadata {
    pub fn new(event_type: &str, occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            occurred_at,
        }
    }
}
