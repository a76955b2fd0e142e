//! Wire representations of backend records
//!
//! Shared by the HTTP transport and the push channel, which both carry the
//! same message shape.

use crate::domain::call::CallDirection;
use crate::domain::message::{DeliveryStatus, Message, MessageDirection};
use crate::domain::number::PhoneNumber;
use crate::domain::shared::value_objects::{normalize_address, MessageId, PhoneNumberId, E164};
use crate::domain::transport::CallRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: String,
    pub direction: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub body: String,
    #[serde(alias = "created_at", alias = "date_sent")]
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

impl TryFrom<MessageDto> for Message {
    type Error = String;

    fn try_from(dto: MessageDto) -> Result<Self, Self::Error> {
        if dto.id.is_empty() {
            return Err("message without id".to_string());
        }
        let direction = match dto.direction.as_str() {
            "inbound" => MessageDirection::Inbound,
            "outbound" | "outbound-api" | "outbound-reply" => MessageDirection::Outbound,
            other => return Err(format!("unknown message direction '{}'", other)),
        };
        let status = match dto.status.as_deref() {
            Some(raw) => DeliveryStatus::parse_provider(raw)
                .ok_or_else(|| format!("unknown delivery status '{}'", raw))?,
            None if direction == MessageDirection::Inbound => DeliveryStatus::Delivered,
            None => DeliveryStatus::Sent,
        };

        Ok(Message {
            id: MessageId::new(dto.id),
            direction,
            from: normalize_address(&dto.from),
            to: normalize_address(&dto.to),
            body: dto.body,
            sent_at: dto.sent_at,
            status,
            read_at: dto.read_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneNumberDto {
    pub id: String,
    pub phone_number: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub rotation_enabled: bool,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub sent_count: u64,
    #[serde(default)]
    pub received_count: u64,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl TryFrom<PhoneNumberDto> for PhoneNumber {
    type Error = String;

    fn try_from(dto: PhoneNumberDto) -> Result<Self, Self::Error> {
        Ok(PhoneNumber {
            id: PhoneNumberId::new(dto.id),
            e164: E164::parse(&dto.phone_number)?,
            label: dto.label,
            rotation_enabled: dto.rotation_enabled,
            active: dto.active,
            sent_count: dto.sent_count,
            received_count: dto.received_count,
            last_used_at: dto.last_used_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecordDto {
    #[serde(alias = "call_sid")]
    pub id: String,
    pub direction: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub status: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: Option<i64>,
}

impl TryFrom<CallRecordDto> for CallRecord {
    type Error = String;

    fn try_from(dto: CallRecordDto) -> Result<Self, Self::Error> {
        let direction = match dto.direction.as_str() {
            "inbound" => CallDirection::Inbound,
            d if d.starts_with("outbound") => CallDirection::Outbound,
            other => return Err(format!("unknown call direction '{}'", other)),
        };
        Ok(CallRecord {
            provider_sid: dto.id,
            direction,
            from: normalize_address(&dto.from),
            to: normalize_address(&dto.to),
            status: dto.status,
            started_at: dto.started_at,
            ended_at: dto.ended_at,
            duration_seconds: dto.duration,
        })
    }
}
