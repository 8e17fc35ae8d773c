//! Feed Port (Driven Port)
//!
//! Transport for the live tick feed. The streaming client only sees frames
//! and transport errors, which keeps its state machine testable without a
//! network.

use async_trait::async_trait;

/// Inbound frame from the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedFrame {
    /// Text payload to hand to the codec.
    Text(String),
    /// Control traffic (ping, pong, empty frames). Proves liveness only.
    Activity,
}

/// Transport-level failure. Every variant triggers a reconnect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection or handshake failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Protocol or I/O error on an open connection.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// Server sent a close frame or the stream ended.
    #[error("connection closed")]
    Closed,

    /// No traffic within the heartbeat timeout.
    #[error("heartbeat timeout")]
    HeartbeatTimeout,
}

impl TransportError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::WebSocket(_) => "websocket",
            Self::Closed => "closed",
            Self::HeartbeatTimeout => "heartbeat_timeout",
        }
    }
}

/// Opens connections to the feed.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Connect to `url` and complete the handshake.
    async fn connect(&self, url: &str) -> Result<Box<dyn FeedConnection>, TransportError>;
}

/// One open feed connection.
#[async_trait]
pub trait FeedConnection: Send {
    /// Send a text frame (e.g. a subscribe request).
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Send a ping frame.
    async fn send_ping(&mut self) -> Result<(), TransportError>;

    /// Wait for the next inbound frame.
    ///
    /// A close frame or end of stream is reported as [`TransportError::Closed`].
    async fn next_frame(&mut self) -> Result<FeedFrame, TransportError>;

    /// Close the connection. Errors are ignored.
    async fn close(&mut self);
}
