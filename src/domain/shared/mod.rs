//! Shared kernel - Common types used across the call, message and number contexts

pub mod error;
pub mod events;
pub mod value_objects;

pub use error::{DomainError, OutboundDraft, Result};
pub use value_objects::*;
