//! Price Feed Infrastructure
//!
//! WebSocket transport, message codec and the reconnecting streaming client.

pub mod client;
pub mod codec;
pub mod heartbeat;
pub mod reconnect;
pub mod websocket;

pub use client::{
    DEFAULT_FEED_URL, StreamingClient, StreamingClientConfig, StreamingClientError,
    resolve_feed_url,
};
pub use codec::{FeedFormat, ParseFailure, ParsedMessage, PriceCodec};
pub use heartbeat::HeartbeatConfig;
pub use reconnect::{ReconnectConfig, ReconnectPolicy, TokioDelay};
pub use websocket::WebSocketConnector;
