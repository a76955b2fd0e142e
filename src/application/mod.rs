//! Application layer - Use cases and application services
//!
//! Orchestrates the domain aggregates on behalf of the user interface and
//! the realtime bridge.

pub mod send_coordinator;
pub mod session_core;

pub use send_coordinator::OutboundSendCoordinator;
pub use session_core::SessionCore;
