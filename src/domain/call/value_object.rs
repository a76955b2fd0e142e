//! Call value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Call placed to us
    Inbound,
    /// Call placed by the local user
    Outbound,
}

/// Call state as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    /// No call
    Idle,
    /// Alerting; for outbound calls this is shown before the provider confirms
    Ringing,
    /// Answered or accepted, waiting for media
    Connecting,
    /// Call is up
    Connected,
    /// Call is over; shown for a fixed window before returning to idle
    Ended,
}

impl CallState {
    /// Whether a call occupies the client in this state
    pub fn is_busy(&self) -> bool {
        !matches!(self, CallState::Idle)
    }

    /// States from which a hangup, reject or provider end is accepted
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            CallState::Ringing | CallState::Connecting | CallState::Connected
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::Ringing => "ringing",
            CallState::Connecting => "connecting",
            CallState::Connected => "connected",
            CallState::Ended => "ended",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason for call ending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Local user hung up
    LocalHangup,
    /// Local user rejected a ringing call
    Rejected,
    /// Provider reported the call over
    RemoteEnded,
    /// Provider reported an error
    Failed(String),
}

/// Input that drives the call state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTrigger {
    /// Provider signals a new inbound call
    IncomingSignal {
        provider_sid: String,
        from: String,
        to: String,
    },
    /// Local user places a call
    UserInitiate { to: String, from_number: String },
    UserAnswer,
    ProviderAccepted { provider_sid: Option<String> },
    ProviderConnected { provider_sid: Option<String> },
    UserHangup,
    UserReject,
    ProviderEnded { provider_sid: Option<String> },
    ProviderError {
        provider_sid: Option<String>,
        reason: String,
    },
    /// Clear an ended call without waiting for the display window
    Reset,
}

impl CallTrigger {
    pub fn name(&self) -> &'static str {
        match self {
            CallTrigger::IncomingSignal { .. } => "incoming_signal",
            CallTrigger::UserInitiate { .. } => "user_initiate",
            CallTrigger::UserAnswer => "user_answer",
            CallTrigger::ProviderAccepted { .. } => "provider_accepted",
            CallTrigger::ProviderConnected { .. } => "provider_connected",
            CallTrigger::UserHangup => "user_hangup",
            CallTrigger::UserReject => "user_reject",
            CallTrigger::ProviderEnded { .. } => "provider_ended",
            CallTrigger::ProviderError { .. } => "provider_error",
            CallTrigger::Reset => "reset",
        }
    }

    /// Provider call sid carried by a provider signal
    pub fn provider_sid(&self) -> Option<&str> {
        match self {
            CallTrigger::IncomingSignal { provider_sid, .. } => Some(provider_sid),
            CallTrigger::ProviderAccepted { provider_sid }
            | CallTrigger::ProviderConnected { provider_sid }
            | CallTrigger::ProviderEnded { provider_sid }
            | CallTrigger::ProviderError { provider_sid, .. } => provider_sid.as_deref(),
            _ => None,
        }
    }
}
