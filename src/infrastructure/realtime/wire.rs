//! Push channel wire format
//!
//! Frames are JSON objects tagged by a `type` discriminant:
//!
//! ```json
//! {"type": "sms_received", "message": {"id": "SM1", "direction": "inbound", ...}}
//! {"type": "call_incoming", "call_sid": "CA1", "from": "+15550199", "to": "+15550001"}
//! ```

use crate::domain::message::{DeliveryStatus, Message};
use crate::domain::realtime::RealtimeEvent;
use crate::domain::shared::value_objects::{normalize_address, MessageId};
use crate::infrastructure::transport::dto::MessageDto;
use serde::Deserialize;
use thiserror::Error;

/// Frame types that carry no domain information
const KEEPALIVE_TYPES: &[&str] = &["ping", "pong", "welcome", "heartbeat"];

#[derive(Error, Debug)]
pub enum WireError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid event: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum PushFrame {
    SmsReceived {
        message: MessageDto,
    },
    SmsSent {
        message: MessageDto,
    },
    SmsStatus {
        id: String,
        status: String,
    },
    CallIncoming {
        call_sid: String,
        from: String,
        to: String,
    },
    CallAccepted {
        call_sid: String,
    },
    CallConnected {
        call_sid: String,
    },
    CallEnded {
        call_sid: String,
    },
    CallError {
        call_sid: String,
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Parse one text frame.
///
/// Returns `Ok(None)` for keepalives.
pub fn parse_frame(text: &str) -> Result<Option<RealtimeEvent>, WireError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let frame_type = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| WireError::Invalid("missing type".to_string()))?;
    if KEEPALIVE_TYPES.contains(&frame_type) {
        return Ok(None);
    }

    let frame: PushFrame = serde_json::from_value(value)?;
    let event = match frame {
        PushFrame::SmsReceived { message } => RealtimeEvent::MessageReceived {
            message: to_message(message)?,
        },
        PushFrame::SmsSent { message } => RealtimeEvent::MessageSent {
            message: to_message(message)?,
        },
        PushFrame::SmsStatus { id, status } => RealtimeEvent::MessageStatus {
            id: MessageId::new(id),
            status: DeliveryStatus::parse_provider(&status)
                .ok_or_else(|| WireError::Invalid(format!("unknown status '{}'", status)))?,
        },
        PushFrame::CallIncoming { call_sid, from, to } => RealtimeEvent::CallIncoming {
            provider_sid: call_sid,
            from: normalize_address(&from),
            to: normalize_address(&to),
        },
        PushFrame::CallAccepted { call_sid } => RealtimeEvent::CallAccepted {
            provider_sid: call_sid,
        },
        PushFrame::CallConnected { call_sid } => RealtimeEvent::CallConnected {
            provider_sid: call_sid,
        },
        PushFrame::CallEnded { call_sid } => RealtimeEvent::CallEnded {
            provider_sid: call_sid,
        },
        PushFrame::CallError { call_sid, reason } => RealtimeEvent::CallFailed {
            provider_sid: call_sid,
            reason: reason.unwrap_or_else(|| "provider error".to_string()),
        },
    };
    Ok(Some(event))
}

fn to_message(dto: MessageDto) -> Result<Message, WireError> {
    Message::try_from(dto).map_err(WireError::Invalid)
}
