//! Price Feed Tracker Binary
//!
//! Seeds and streams live prices for the configured assets and serves them
//! over HTTP.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-feed-tracker
//! ```
//!
//! # Environment Variables
//!
//! All optional.
//! - `TRACKED_ASSETS`: comma-separated asset ids (default: bitcoin)
//! - `HISTORY_MAX_POINTS`: ticks kept per asset (default: 1800)
//! - `RECONNECT_DELAY_SECS`: fixed reconnect delay (default: 5)
//! - `RECONNECT_MAX_ATTEMPTS`: 0 = unlimited (default: 0)
//! - `RECONNECT_JITTER`: delay jitter fraction (default: 0.0)
//! - `SEED_ENABLED` / `SEED_BASE_URL` / `SEED_TIMEOUT_SECS`: REST seeding
//! - `FEED_URL`: WebSocket URL template with `{asset}` (default: `CoinCap` prices)
//! - `FEED_FORMAT`: `asset_keyed` | `ticker` (default: `asset_keyed`)
//! - `FEED_SUBSCRIBE_MESSAGE`: text frame sent after connecting
//! - `HEARTBEAT_INTERVAL_SECS` / `HEARTBEAT_TIMEOUT_SECS`: ping and idle timeout
//! - `TRACKER_HTTP_PORT`: read API, health and metrics port (default: 8080)
//! - `OTEL_ENABLED`: export spans over OTLP (default: false)
//! - `RUST_LOG`: log filter (default: `price_feed_tracker=info`)

use std::sync::Arc;
use std::time::Duration;

use price_feed_tracker::infrastructure::telemetry;
use price_feed_tracker::{
    AssetId, AssetTracker, FeedConnector, HealthServer, HealthServerState, PriceHistoryStore,
    RestSeedSource, TrackerConfig, WebSocketConnector, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
#[allow(clippy::expect_used)]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting price feed tracker");

    let _metrics_handle = init_metrics();

    let config = TrackerConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let store = Arc::new(PriceHistoryStore::new(config.history_max_points));
    let connector: Arc<dyn FeedConnector> = Arc::new(WebSocketConnector::new());

    let mut tracker = AssetTracker::new(
        Arc::clone(&store),
        connector,
        config.client_template(),
        shutdown_token.child_token(),
    );
    if config.seed.enabled {
        let seed_source = RestSeedSource::new(config.seed.base_url.clone(), config.seed.timeout)?;
        tracker = tracker.with_seed_source(Arc::new(seed_source), config.seed.timeout);
    }
    let tracker = Arc::new(tracker);

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&tracker),
    ));
    let health_server = HealthServer::new(
        config.server.http_port,
        health_state,
        shutdown_token.clone(),
    );
    let server_handle = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    // Seeds run concurrently; each asset starts streaming once its own seed
    // attempt has finished.
    for asset in config.assets.clone() {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move {
            tracker.track(asset).await;
        });
    }

    tracing::info!(assets = config.assets.len(), "Price feed tracker ready");

    await_shutdown(shutdown_token).await;

    let drain = async {
        tracker.shutdown().await;
        let _ = server_handle.await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, drain).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out"
        );
    }

    tracing::info!("Price feed tracker stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &TrackerConfig) {
    let assets: Vec<&str> = config.assets.iter().map(AssetId::as_str).collect();
    tracing::info!(
        assets = ?assets,
        history_max_points = config.history_max_points,
        reconnect_delay_secs = config.reconnect.delay.as_secs(),
        seed_enabled = config.seed.enabled,
        feed_format = config.feed.format.as_str(),
        http_port = config.server.http_port,
        "Configuration loaded"
    );
    tracing::debug!(
        feed_url = %config.feed.url_template,
        seed_base_url = %config.seed.base_url,
        "Endpoints"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT), then cancel everything.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
