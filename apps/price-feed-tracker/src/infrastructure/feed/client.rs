//! Streaming Price Client
//!
//! Holds one long-lived connection to the tick feed for a single asset and
//! appends every valid price to the shared history store.
//!
//! # Lifecycle
//!
//! `Idle → Connecting → Streaming`, and on any transport failure
//! `Reconnecting → (fixed delay) → Connecting` again, indefinitely unless a
//! maximum attempt count is configured. `stop()` cancels the client from any
//! state and returns it to `Idle`.
//!
//! Bad messages are dropped one at a time and never end the connection; only
//! transport errors trigger a reconnect. Nothing here is propagated to
//! readers of the store, which simply see no new data.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::codec::{FeedFormat, ParsedMessage, PriceCodec};
use super::heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{Delay, FeedConnection, FeedConnector, FeedFrame, TransportError};
use crate::domain::connection::{ConnectionState, ConnectionStatus};
use crate::domain::history::PriceHistoryStore;
use crate::domain::tick::AssetId;
use crate::infrastructure::metrics;

/// Placeholder replaced by the asset identifier in feed URL templates.
pub const ASSET_PLACEHOLDER: &str = "{asset}";

/// Default feed URL template (`CoinCap` prices stream).
pub const DEFAULT_FEED_URL: &str = "wss://ws.coincap.io/prices?assets={asset}";

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end the client's run loop.
#[derive(Debug, thiserror::Error)]
pub enum StreamingClientError {
    /// Configured maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for one streaming client.
#[derive(Debug, Clone)]
pub struct StreamingClientConfig {
    /// WebSocket URL, already resolved for the asset.
    pub url: String,
    /// Inbound payload format.
    pub format: FeedFormat,
    /// Text frame sent right after connecting, if the feed needs one.
    pub subscribe_message: Option<String>,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Heartbeat configuration.
    pub heartbeat: HeartbeatConfig,
}

impl StreamingClientConfig {
    /// Create a configuration with default format, reconnect and heartbeat.
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            url,
            format: FeedFormat::default(),
            subscribe_message: None,
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }

    /// Configuration for the `CoinCap` prices stream of `asset`.
    #[must_use]
    pub fn coincap(asset: &AssetId) -> Self {
        Self::new(resolve_feed_url(DEFAULT_FEED_URL, asset))
    }

    /// Copy of this configuration with `{asset}` substituted in the URL and
    /// subscribe message.
    #[must_use]
    pub fn for_asset(&self, asset: &AssetId) -> Self {
        Self {
            url: resolve_feed_url(&self.url, asset),
            subscribe_message: self
                .subscribe_message
                .as_deref()
                .map(|template| resolve_feed_url(template, asset)),
            ..self.clone()
        }
    }
}

/// Substitute the asset into a URL template.
#[must_use]
pub fn resolve_feed_url(template: &str, asset: &AssetId) -> String {
    template.replace(ASSET_PLACEHOLDER, asset.as_str())
}

// =============================================================================
// Streaming Client
// =============================================================================

/// Reconnecting feed client for one asset.
pub struct StreamingClient {
    asset: AssetId,
    config: StreamingClientConfig,
    codec: PriceCodec,
    store: Arc<PriceHistoryStore>,
    connector: Arc<dyn FeedConnector>,
    delay: Arc<dyn Delay>,
    status: Arc<ConnectionStatus>,
    cancel: CancellationToken,
}

impl StreamingClient {
    /// Create a new client. Nothing happens until [`StreamingClient::run`].
    #[must_use]
    pub fn new(
        asset: AssetId,
        config: StreamingClientConfig,
        store: Arc<PriceHistoryStore>,
        connector: Arc<dyn FeedConnector>,
        delay: Arc<dyn Delay>,
        cancel: CancellationToken,
    ) -> Self {
        let codec = PriceCodec::new(asset.clone(), config.format);
        Self {
            asset,
            config,
            codec,
            store,
            connector,
            delay,
            status: Arc::new(ConnectionStatus::new()),
            cancel,
        }
    }

    /// Asset this client streams.
    #[must_use]
    pub const fn asset(&self) -> &AssetId {
        &self.asset
    }

    /// Shared status record.
    #[must_use]
    pub fn status(&self) -> Arc<ConnectionStatus> {
        Arc::clone(&self.status)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.status.state()
    }

    /// Stop the client: close the connection and make no further attempts.
    ///
    /// Ticks already stored are kept.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.status.set_state(ConnectionState::Idle);
        metrics::set_feed_connected(&self.asset, false);
    }

    /// Whether `stop()` was called or the parent token was cancelled.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run the connection loop until stopped.
    ///
    /// # Errors
    ///
    /// Returns `StreamingClientError::MaxReconnectAttemptsExceeded` only when
    /// a maximum attempt count is configured and exhausted.
    pub async fn run(self: Arc<Self>) -> Result<(), StreamingClientError> {
        let mut reconnect_policy = ReconnectPolicy::new(self.config.reconnect.clone());
        let result = self.run_loop(&mut reconnect_policy).await;

        self.status.set_state(ConnectionState::Idle);
        metrics::set_feed_connected(&self.asset, false);
        tracing::info!(asset = %self.asset, "Streaming client stopped");

        result
    }

    async fn run_loop(
        &self,
        reconnect_policy: &mut ReconnectPolicy,
    ) -> Result<(), StreamingClientError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            let connection_id = Uuid::new_v4();
            let span = tracing::info_span!(
                "feed_connection",
                asset = %self.asset,
                connection_id = %connection_id
            );

            let error = match self
                .connect_and_stream(reconnect_policy)
                .instrument(span)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            tracing::warn!(asset = %self.asset, error = %error, "Feed connection error");
            self.status.set_error(error.to_string());
            metrics::record_transport_error(&self.asset, error.kind());
            metrics::set_feed_connected(&self.asset, false);

            if self.cancel.is_cancelled() {
                return Ok(());
            }

            let Some(delay) = reconnect_policy.next_delay() else {
                tracing::error!(
                    asset = %self.asset,
                    attempts = reconnect_policy.attempt_count(),
                    "Giving up on feed after maximum reconnection attempts"
                );
                return Err(StreamingClientError::MaxReconnectAttemptsExceeded);
            };

            self.transition(ConnectionState::Reconnecting);
            self.status.increment_reconnect_attempts();
            metrics::record_reconnect(&self.asset);

            tracing::info!(
                asset = %self.asset,
                attempt = reconnect_policy.attempt_count(),
                delay_ms = delay.as_millis(),
                "Reconnecting to price feed"
            );

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!(asset = %self.asset, "Client stopped during reconnect delay");
                    return Ok(());
                }
                () = self.delay.sleep(delay) => {}
            }
        }
    }

    /// Connect and stream until cancelled (`Ok`) or a transport error (`Err`).
    async fn connect_and_stream(
        &self,
        reconnect_policy: &mut ReconnectPolicy,
    ) -> Result<(), TransportError> {
        self.transition(ConnectionState::Connecting);
        tracing::info!(url = %self.config.url, "Connecting to price feed");

        let mut connection = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = self.connector.connect(&self.config.url) => result?,
        };

        if let Some(subscribe) = &self.config.subscribe_message {
            tracing::debug!("Sending subscribe message");
            connection.send_text(subscribe.clone()).await?;
        }

        self.transition(ConnectionState::Streaming);
        reconnect_policy.reset();
        metrics::set_feed_connected(&self.asset, true);
        tracing::info!("Price feed streaming");

        let result = self.stream(connection.as_mut()).await;
        connection.close().await;
        result
    }

    async fn stream(&self, connection: &mut dyn FeedConnection) -> Result<(), TransportError> {
        let heartbeat_state = Arc::new(HeartbeatState::new());
        let heartbeat_cancel = self.cancel.child_token();
        let _heartbeat_guard = heartbeat_cancel.clone().drop_guard();

        let mut heartbeat_rx = if self.config.heartbeat.is_enabled() {
            let (heartbeat_tx, heartbeat_rx) = mpsc::channel::<HeartbeatEvent>(10);
            let manager = HeartbeatManager::new(
                self.config.heartbeat.clone(),
                Arc::clone(&heartbeat_state),
                heartbeat_tx,
                heartbeat_cancel,
            );
            tokio::spawn(manager.run());
            Some(heartbeat_rx)
        } else {
            None
        };

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    return Ok(());
                }
                event = next_heartbeat_event(&mut heartbeat_rx) => {
                    match event {
                        Some(HeartbeatEvent::SendPing) => connection.send_ping().await?,
                        Some(HeartbeatEvent::Timeout) => {
                            return Err(TransportError::HeartbeatTimeout);
                        }
                        None => {
                            tracing::debug!("Heartbeat channel closed");
                            heartbeat_rx = None;
                        }
                    }
                }
                frame = connection.next_frame() => {
                    heartbeat_state.record_activity();
                    match frame? {
                        FeedFrame::Text(text) => self.handle_text_message(&text),
                        FeedFrame::Activity => {}
                    }
                }
            }
        }
    }

    /// Decode one message and store or drop it.
    fn handle_text_message(&self, text: &str) {
        match self.codec.decode(text) {
            ParsedMessage::Price(price) => {
                let stored = self.store.append_price(&self.asset, price);
                if stored {
                    metrics::record_tick_appended(&self.asset);
                    metrics::set_series_length(&self.asset, self.store.len(&self.asset));
                } else {
                    metrics::record_tick_rejected(&self.asset);
                }
                self.status.record_message(stored);
            }
            ParsedMessage::Unparseable(reason) => {
                tracing::trace!(reason = reason.as_str(), "Dropping feed message");
                metrics::record_message_dropped(&self.asset, reason.as_str());
                self.status.record_message(false);
            }
        }
    }

    /// Apply a state change unless the client has been stopped.
    fn transition(&self, state: ConnectionState) {
        if self.cancel.is_cancelled() && state != ConnectionState::Idle {
            return;
        }
        self.status.set_state(state);
    }
}

async fn next_heartbeat_event(
    rx: &mut Option<mpsc::Receiver<HeartbeatEvent>>,
) -> Option<HeartbeatEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
