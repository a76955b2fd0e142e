//! Real-time event delivery: push channel, wire format and the bridge

pub mod bridge;
pub mod channel;
pub mod wire;

pub use bridge::{BridgeConfig, BridgeHandle, ChannelState, RealtimeEventBridge};
pub use channel::{ChannelError, FrameStream, PushChannel, WebSocketChannel};
