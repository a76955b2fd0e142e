//! Push channel transport

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use thiserror::Error;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Channel closed by server")]
    Closed,

    #[error("Read failed: {0}")]
    Read(String),
}

/// Text frames received on a live connection
pub type FrameStream = BoxStream<'static, Result<String, ChannelError>>;

/// A long-lived connection that delivers JSON push frames
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn connect(&self) -> Result<FrameStream, ChannelError>;
}

/// Push channel over a WebSocket
pub struct WebSocketChannel {
    url: String,
}

impl WebSocketChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl PushChannel for WebSocketChannel {
    async fn connect(&self) -> Result<FrameStream, ChannelError> {
        let (socket, response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        debug!("WebSocket handshake completed with status {}", response.status());

        let frames = socket.filter_map(|msg| async move {
            match msg {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Close(_)) => Some(Err(ChannelError::Closed)),
                // Ping/pong are answered by tungstenite
                Ok(_) => None,
                Err(tungstenite::Error::ConnectionClosed) => Some(Err(ChannelError::Closed)),
                Err(e) => Some(Err(ChannelError::Read(e.to_string()))),
            }
        });

        Ok(frames.boxed())
    }
}
