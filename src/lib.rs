//! Switchline - real-time communications core for a CRM client
//!
//! Owns the shared state behind an SMS inbox and a single voice call:
//! the outbound number pool, the merged message set and its conversations,
//! the call session state machine and the realtime event bridge that keeps
//! them current.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{OutboundSendCoordinator, SessionCore};
pub use domain::shared::error::{DomainError, Result};
