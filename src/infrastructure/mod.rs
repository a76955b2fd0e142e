//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - The HTTP provider transport
//! - The push channel and the realtime event bridge
//! - Metrics export

pub mod metrics;
pub mod realtime;
pub mod transport;
