//! Number bounded context - owned outbound numbers and rotation

pub mod entity;
pub mod pool;
pub mod selector;

pub use entity::{NumberFlags, PhoneNumber};
pub use pool::PhoneNumberPool;
pub use selector::NumberSelector;
