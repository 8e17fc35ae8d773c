//! WebSocket Feed Adapter
//!
//! `FeedConnector` implementation over `tokio-tungstenite`. TLS (`wss://`)
//! uses rustls with webpki roots.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{FeedConnection, FeedConnector, FeedFrame, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector that opens real WebSocket connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a new connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FeedConnector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn FeedConnection>, TransportError> {
        let (stream, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        Ok(Box::new(WebSocketConnection { stream }))
    }
}

/// One open WebSocket connection.
pub struct WebSocketConnection {
    stream: WsStream,
}

#[async_trait]
impl FeedConnection for WebSocketConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }

    async fn send_ping(&mut self) -> Result<(), TransportError> {
        self.stream
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }

    async fn next_frame(&mut self) -> Result<FeedFrame, TransportError> {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => Ok(FeedFrame::Text(text.as_str().to_owned())),
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                Ok(text) => Ok(FeedFrame::Text(text)),
                Err(_) => {
                    tracing::trace!(len = data.len(), "Ignoring non UTF-8 binary frame");
                    Ok(FeedFrame::Activity)
                }
            },
            Some(Ok(Message::Ping(data))) => {
                self.stream
                    .send(Message::Pong(data))
                    .await
                    .map_err(|e| TransportError::WebSocket(e.to_string()))?;
                Ok(FeedFrame::Activity)
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(frame = ?frame, "Server sent close frame");
                Err(TransportError::Closed)
            }
            Some(Ok(_)) => Ok(FeedFrame::Activity),
            Some(Err(e)) => Err(TransportError::WebSocket(e.to_string())),
            None => {
                tracing::info!("WebSocket stream ended");
                Err(TransportError::Closed)
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "Error closing WebSocket");
        }
    }
}
