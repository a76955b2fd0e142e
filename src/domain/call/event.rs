//! Call domain events

use crate::domain::call::value_object::{CallDirection, CallState, EndReason};
use crate::domain::shared::events::{DomainEvent, EventMetadata};
use crate::domain::shared::value_objects::CallId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base struct for all call events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEventBase {
    pub metadata: EventMetadata,
    pub call_id: CallId,
}

impl CallEventBase {
    pub fn new(event_type: &str, call_id: CallId, at: DateTime<Utc>) -> Self {
        Self {
            metadata: EventMetadata::new(event_type, at),
            call_id,
        }
    }
}

/// A session was created, by an incoming signal or a user initiate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStarted {
    pub base: CallEventBase,
    pub direction: CallDirection,
    pub counterpart: String,
    pub from_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStateChanged {
    pub base: CallEventBase,
    pub from: CallState,
    pub to: CallState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallMuteChanged {
    pub base: CallEventBase,
    pub muted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEnded {
    pub base: CallEventBase,
    pub reason: EndReason,
    pub duration_seconds: Option<i64>,
}

/// The ended call left the screen and the client is idle again
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallCleared {
    pub base: CallEventBase,
}

macro_rules! call_event {
    ($($event:ident => $name:literal),* $(,)?) => {
        $(
            impl DomainEvent for $event {
                fn event_type(&self) -> &'static str {
                    $name
                }

                fn occurred_at(&self) -> DateTime<Utc> {
                    self.base.metadata.occurred_at
                }
            }
        )*
    };
}

call_event! {
    CallStarted => "call.started",
    CallStateChanged => "call.state_changed",
    CallMuteChanged => "call.mute_changed",
    CallEnded => "call.ended",
    CallCleared => "call.cleared",
}

/// Union of all call events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CallEvent {
    Started(CallStarted),
    StateChanged(CallStateChanged),
    MuteChanged(CallMuteChanged),
    Ended(CallEnded),
    Cleared(CallCleared),
}

impl CallEvent {
    pub fn call_id(&self) -> &CallId {
        &self.base().call_id
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            CallEvent::Started(e) => e.event_type(),
            CallEvent::StateChanged(e) => e.event_type(),
            CallEvent::MuteChanged(e) => e.event_type(),
            CallEvent::Ended(e) => e.event_type(),
            CallEvent::Cleared(e) => e.event_type(),
        }
    }

    fn base(&self) -> &CallEventBase {
        match self {
            CallEvent::Started(e) => &e.base,
            CallEvent::StateChanged(e) => &e.base,
            CallEvent::MuteChanged(e) => &e.base,
            CallEvent::Ended(e) => &e.base,
            CallEvent::Cleared(e) => &e.base,
        }
    }
}
