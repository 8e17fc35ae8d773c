//! Application Services
//!
//! `AssetTracker` ties the history store, seed source and one streaming
//! client per asset together:
//!
//! 1. seed the asset's series from a REST quote if it is empty;
//! 2. start a streaming client for it, at most one per asset.
//!
//! Every failure here is absorbed. A failed seed leaves the series empty and
//! the stream fills it later; a failed stream reconnects on its own.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Delay, FeedConnector, SeedError, SeedSource};
use crate::domain::connection::ConnectionStatus;
use crate::domain::history::PriceHistoryStore;
use crate::domain::tick::AssetId;
use crate::infrastructure::feed::{StreamingClient, StreamingClientConfig, TokioDelay};
use crate::infrastructure::metrics::{self, SeedOutcome};

struct TrackedClient {
    client: Arc<StreamingClient>,
    handle: JoinHandle<()>,
}

impl TrackedClient {
    fn is_running(&self) -> bool {
        !self.client.is_stopped() && !self.handle.is_finished()
    }
}

/// Seeds and streams a set of assets into one shared store.
pub struct AssetTracker {
    store: Arc<PriceHistoryStore>,
    connector: Arc<dyn FeedConnector>,
    delay: Arc<dyn Delay>,
    seed_source: Option<Arc<dyn SeedSource>>,
    seed_timeout: Duration,
    client_template: StreamingClientConfig,
    cancel: CancellationToken,
    clients: Mutex<HashMap<AssetId, TrackedClient>>,
    closed: AtomicBool,
}

impl AssetTracker {
    /// Create a tracker with no seed source and real-time reconnect delays.
    ///
    /// `client_template` may contain `{asset}` placeholders. Clients are
    /// cancelled together with `cancel`.
    #[must_use]
    pub fn new(
        store: Arc<PriceHistoryStore>,
        connector: Arc<dyn FeedConnector>,
        client_template: StreamingClientConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            connector,
            delay: Arc::new(TokioDelay),
            seed_source: None,
            seed_timeout: Duration::from_secs(5),
            client_template,
            cancel,
            clients: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Seed empty series from `source`, giving up after `timeout`.
    #[must_use]
    pub fn with_seed_source(mut self, source: Arc<dyn SeedSource>, timeout: Duration) -> Self {
        self.seed_source = Some(source);
        self.seed_timeout = timeout;
        self
    }

    /// Replace the reconnect delay provider.
    #[must_use]
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    /// Shared history store.
    #[must_use]
    pub const fn store(&self) -> &Arc<PriceHistoryStore> {
        &self.store
    }

    /// Seed if empty, then start streaming.
    ///
    /// Returns whether a new client was started.
    pub async fn track(&self, asset: AssetId) -> bool {
        self.seed(&asset).await;
        self.start(asset)
    }

    /// Seed the asset's series if it is empty. Returns whether a tick was stored.
    pub async fn seed(&self, asset: &AssetId) -> bool {
        let Some(source) = &self.seed_source else {
            return false;
        };

        let timeout = self.seed_timeout;
        let seeded = self
            .store
            .seed_if_empty(asset, move || async move {
                tokio::time::timeout(timeout, source.fetch_price(asset))
                    .await
                    .unwrap_or(Err(SeedError::Timeout(timeout.as_millis())))
            })
            .await;

        let outcome = if seeded {
            metrics::set_series_length(asset, self.store.len(asset));
            SeedOutcome::Seeded
        } else if self.store.is_empty(asset) {
            SeedOutcome::Failed
        } else {
            SeedOutcome::Skipped
        };
        metrics::record_seed_attempt(asset, outcome);

        seeded
    }

    /// Start a streaming client for `asset` unless one is already running.
    ///
    /// Refused once the tracker is shut down or its token is cancelled.
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, asset: AssetId) -> bool {
        let mut clients = self.clients.lock();
        if self.closed.load(Ordering::Acquire) || self.cancel.is_cancelled() {
            tracing::debug!(asset = %asset, "Tracker shut down, not starting client");
            return false;
        }
        if clients.get(&asset).is_some_and(TrackedClient::is_running) {
            tracing::debug!(asset = %asset, "Client already running");
            return false;
        }

        let client = Arc::new(StreamingClient::new(
            asset.clone(),
            self.client_template.for_asset(&asset),
            Arc::clone(&self.store),
            Arc::clone(&self.connector),
            Arc::clone(&self.delay),
            self.cancel.child_token(),
        ));

        let task_client = Arc::clone(&client);
        let handle = tokio::spawn(async move {
            let asset = task_client.asset().clone();
            if let Err(e) = task_client.run().await {
                tracing::error!(asset = %asset, error = %e, "Streaming client exited");
            }
        });

        tracing::info!(asset = %asset, "Started streaming client");
        clients.insert(asset, TrackedClient { client, handle });
        true
    }

    /// Stop the asset's client. Returns whether one was running.
    ///
    /// The stored series is kept, and the status stays readable as `Idle`.
    pub fn stop(&self, asset: &AssetId) -> bool {
        let clients = self.clients.lock();
        let Some(tracked) = clients.get(asset) else {
            return false;
        };

        let was_running = tracked.is_running();
        tracked.client.stop();
        if was_running {
            tracing::info!(asset = %asset, "Stopped streaming client");
        }
        was_running
    }

    /// Stop every client.
    pub fn stop_all(&self) {
        for tracked in self.clients.lock().values() {
            tracked.client.stop();
        }
    }

    /// Stop every client and wait for their tasks to finish.
    ///
    /// Later calls to `start` are refused.
    pub async fn shutdown(&self) {
        let tracked: Vec<TrackedClient> = {
            let mut clients = self.clients.lock();
            self.closed.store(true, Ordering::Release);
            clients.drain().map(|(_, t)| t).collect()
        };

        for entry in &tracked {
            entry.client.stop();
        }
        for entry in tracked {
            if let Err(e) = entry.handle.await {
                tracing::warn!(asset = %entry.client.asset(), error = %e, "Client task failed");
            }
        }
    }

    /// Status of the asset's client, if it was ever started.
    #[must_use]
    pub fn status(&self, asset: &AssetId) -> Option<Arc<ConnectionStatus>> {
        self.clients.lock().get(asset).map(|t| t.client.status())
    }

    /// Assets with a registered client, sorted.
    #[must_use]
    pub fn tracked_assets(&self) -> Vec<AssetId> {
        let mut assets: Vec<AssetId> = self.clients.lock().keys().cloned().collect();
        assets.sort();
        assets
    }
}

impl std::fmt::Debug for AssetTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetTracker")
            .field("tracked", &self.clients.lock().len())
            .field("seeding", &self.seed_source.is_some())
            .finish_non_exhaustive()
    }
}
