//! Domain errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain result type
pub type Result<T> = std::result::Result<T, DomainError>;

/// Input of a send or call that failed, kept so the user can retry it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundDraft {
    pub to: String,
    pub body: Option<String>,
    pub explicit_from: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("No active rotation-enabled phone number available")]
    NoEligibleNumber,

    #[error("A call is already in progress")]
    SessionBusy,

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Send failed: {reason}")]
    SendFailed { reason: String, draft: OutboundDraft },

    #[error("Call is not connected")]
    NotConnected,

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl DomainError {
    /// Whether the error should be shown to the user.
    ///
    /// `InvalidTransition` is a UI race artifact and is only logged.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, DomainError::InvalidTransition(_))
    }

    /// The retryable input of a failed send, if any
    pub fn draft(&self) -> Option<&OutboundDraft> {
        match self {
            DomainError::SendFailed { draft, .. } => Some(draft),
            _ => None,
        }
    }
}
