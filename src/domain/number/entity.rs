//! Phone number entity

use crate::domain::shared::value_objects::{PhoneNumberId, E164};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An outbound number owned by the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
    pub id: PhoneNumberId,
    pub e164: E164,
    pub label: String,
    pub rotation_enabled: bool,
    pub active: bool,
    pub sent_count: u64,
    pub received_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl PhoneNumber {
    pub fn new(id: PhoneNumberId, e164: E164, label: impl Into<String>) -> Self {
        Self {
            id,
            e164,
            label: label.into(),
            rotation_enabled: true,
            active: true,
            sent_count: 0,
            received_count: 0,
            last_used_at: None,
        }
    }

    pub fn with_rotation(mut self, enabled: bool) -> Self {
        self.rotation_enabled = enabled;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn with_last_used_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_used_at = Some(at);
        self
    }

    /// Whether the number takes part in automatic rotation
    pub fn is_rotation_eligible(&self) -> bool {
        self.active && self.rotation_enabled
    }

    /// Whether `key` names this number, by id or by E.164 address
    pub fn matches(&self, key: &str) -> bool {
        self.id.as_str() == key || self.e164.as_str() == key
    }

    /// Record a confirmed outbound send or call
    pub fn record_sent(&mut self, at: DateTime<Utc>) {
        self.sent_count += 1;
        self.last_used_at = Some(match self.last_used_at {
            Some(prev) if prev > at => prev,
            _ => at,
        });
    }

    pub fn record_received(&mut self) {
        self.received_count += 1;
    }
}

/// Flag update sent to the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberFlags {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}
