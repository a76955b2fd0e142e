//! Normalized real-time events
//!
//! The provider's push vocabulary is translated into these before anything
//! in the domain sees it.

use crate::domain::message::{DeliveryStatus, Message};
use crate::domain::shared::value_objects::MessageId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    MessageReceived {
        message: Message,
    },
    MessageSent {
        message: Message,
    },
    MessageStatus {
        id: MessageId,
        status: DeliveryStatus,
    },
    /// Snapshot returned by the polling backstop
    MessagesPolled {
        messages: Vec<Message>,
    },
    CallIncoming {
        provider_sid: String,
        from: String,
        to: String,
    },
    CallAccepted {
        provider_sid: String,
    },
    CallConnected {
        provider_sid: String,
    },
    CallEnded {
        provider_sid: String,
    },
    CallFailed {
        provider_sid: String,
        reason: String,
    },
}

impl RealtimeEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::MessageReceived { .. } => "message_received",
            RealtimeEvent::MessageSent { .. } => "message_sent",
            RealtimeEvent::MessageStatus { .. } => "message_status",
            RealtimeEvent::MessagesPolled { .. } => "messages_polled",
            RealtimeEvent::CallIncoming { .. } => "call_incoming",
            RealtimeEvent::CallAccepted { .. } => "call_accepted",
            RealtimeEvent::CallConnected { .. } => "call_connected",
            RealtimeEvent::CallEnded { .. } => "call_ended",
            RealtimeEvent::CallFailed { .. } => "call_failed",
        }
    }
}
