//! Provider transport port
//!
//! The REST surface of the backend, seen as a request/response interface.
//! Defined here as a trait and implemented in the infrastructure layer.

use crate::domain::call::{CallDirection, CallTrigger};
use crate::domain::message::Message;
use crate::domain::number::{NumberFlags, PhoneNumber};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::{MessageId, PhoneNumberId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Provider rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Short reason suitable for showing next to a failed send
    pub fn reason(&self) -> String {
        match self {
            TransportError::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<TransportError> for DomainError {
    fn from(e: TransportError) -> Self {
        DomainError::Transport(e.reason())
    }
}

/// Outbound SMS submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub from: String,
    pub to: String,
    pub body: String,
}

/// Provider's answer to an initiate-call request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallHandle {
    pub provider_sid: String,
}

/// A historical call as listed by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub provider_sid: String,
    pub direction: CallDirection,
    pub from: String,
    pub to: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

impl CallRecord {
    /// The provider signal a finished call stands for.
    ///
    /// `None` while the provider still has the call queued, ringing or in
    /// progress.
    pub fn terminal_trigger(&self) -> Option<CallTrigger> {
        let provider_sid = Some(self.provider_sid.clone());
        match self.status.as_str() {
            "completed" => Some(CallTrigger::ProviderEnded { provider_sid }),
            "busy" | "failed" | "no-answer" | "canceled" => Some(CallTrigger::ProviderError {
                provider_sid,
                reason: self.status.clone(),
            }),
            _ => None,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    /// List messages, optionally only those created or updated at or after
    /// `since`.
    ///
    /// A status or read change bumps a message's update time, so an old
    /// message whose delivery status moved comes back in an incremental list.
    async fn list_messages(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, TransportError>;

    async fn send_message(&self, request: SendMessageRequest) -> Result<Message, TransportError>;

    async fn delete_message(&self, id: &MessageId) -> Result<(), TransportError>;

    async fn delete_conversation(&self, counterpart: &str) -> Result<(), TransportError>;

    async fn mark_read(&self, counterpart: &str) -> Result<(), TransportError>;

    async fn list_calls(&self) -> Result<Vec<CallRecord>, TransportError>;

    async fn initiate_call(&self, from: &str, to: &str) -> Result<CallHandle, TransportError>;

    /// Hang up or cancel a call leg at the provider
    async fn end_call(&self, provider_sid: &str) -> Result<(), TransportError>;

    async fn list_phone_numbers(&self) -> Result<Vec<PhoneNumber>, TransportError>;

    async fn update_phone_number(
        &self,
        id: &PhoneNumberId,
        flags: NumberFlags,
    ) -> Result<PhoneNumber, TransportError>;
}
