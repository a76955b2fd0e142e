//! Message bounded context - SMS records and the conversations derived from them

pub mod conversation;
pub mod entity;
pub mod store;

pub use conversation::{project, Conversation, ConversationAggregator};
pub use entity::{DeliveryStatus, Message, MessageDirection};
pub use store::{MergeOutcome, MessageStore};
