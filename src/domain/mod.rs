//! Domain layer - Core session logic and rules
//!
//! This layer contains:
//! - The call session aggregate and its state machine
//! - Messages, the message store and the conversation projection
//! - The phone number pool and outbound number selection
//! - Normalized real-time events
//! - The provider transport port

pub mod call;
pub mod message;
pub mod number;
pub mod realtime;
pub mod shared;
pub mod transport;

// Re-export commonly used types
pub use shared::{DomainError, Result};
