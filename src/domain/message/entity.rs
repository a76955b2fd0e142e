//! Message entity

use crate::domain::shared::value_objects::{normalize_address, MessageId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message direction relative to the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

/// Delivery status reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Queued,
    Sent,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    /// Position in the delivery lifecycle. Status only moves forward.
    fn rank(self) -> u8 {
        match self {
            DeliveryStatus::Queued => 0,
            DeliveryStatus::Sent => 1,
            DeliveryStatus::Delivered | DeliveryStatus::Failed => 2,
        }
    }

    /// Combine two observations of the same message's status
    pub fn merge(self, other: DeliveryStatus) -> DeliveryStatus {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    /// Map a provider status string, folding the provider's finer states
    pub fn parse_provider(s: &str) -> Option<Self> {
        match s {
            "queued" | "accepted" | "sending" => Some(DeliveryStatus::Queued),
            "sent" => Some(DeliveryStatus::Sent),
            "delivered" | "read" => Some(DeliveryStatus::Delivered),
            "failed" | "undelivered" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

/// A single SMS record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub direction: MessageDirection,
    pub from: String,
    pub to: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    /// Build the optimistic record for an outbound send
    pub fn optimistic(from: &str, to: &str, body: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::temporary(),
            direction: MessageDirection::Outbound,
            from: normalize_address(from),
            to: normalize_address(to),
            body: body.to_string(),
            sent_at: now,
            status: DeliveryStatus::Queued,
            read_at: None,
        }
    }

    /// The address on the non-self side
    pub fn counterpart(&self) -> &str {
        match self.direction {
            MessageDirection::Inbound => &self.from,
            MessageDirection::Outbound => &self.to,
        }
    }

    /// The address on our side
    pub fn own_address(&self) -> &str {
        match self.direction {
            MessageDirection::Inbound => &self.to,
            MessageDirection::Outbound => &self.from,
        }
    }

    pub fn is_unread(&self) -> bool {
        self.direction == MessageDirection::Inbound && self.read_at.is_none()
    }

    pub fn is_optimistic(&self) -> bool {
        self.id.is_temporary()
    }
}
