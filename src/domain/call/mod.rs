//! Call bounded context - the lifecycle of the client's single voice call

pub mod aggregate;
pub mod event;
pub mod machine;
pub mod value_object;

pub use aggregate::CallSession;
pub use event::CallEvent;
pub use machine::{CallSessionMachine, CallTransition};
pub use value_object::{CallDirection, CallState, CallTrigger, EndReason};
