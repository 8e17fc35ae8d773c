//! HTTP Read API, Health and Metrics
//!
//! Read-only view of the tracked series for dashboards, plus the probes and
//! Prometheus endpoint used by orchestrators and monitoring.
//!
//! # Endpoints
//!
//! - `GET /assets` - tracked assets with state and latest price
//! - `GET /assets/{asset}/history` - series snapshot with summary, optionally
//!   limited to the last `?window_secs=` seconds
//! - `GET /assets/{asset}/price` - latest price, `404` while waiting
//! - `GET /health` - JSON health status
//! - `GET /healthz` - liveness probe
//! - `GET /readyz` - readiness probe (some asset has data)
//! - `GET /metrics` - Prometheus metrics in text format
//!
//! An empty series is not an error: history answers `"status": "waiting"`
//! with no points until the first tick arrives.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::AssetTracker;
use crate::domain::connection::{ConnectionState, StatusReport};
use crate::domain::history::SeriesSummary;
use crate::domain::tick::{AssetId, Tick};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Response Types
// =============================================================================

/// Whether a series has data yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesStatus {
    /// No tick stored yet.
    Waiting,
    /// At least one tick stored.
    Live,
}

/// Entry in the asset listing.
#[derive(Debug, Clone, Serialize)]
pub struct AssetOverview {
    /// Asset identifier.
    pub asset: AssetId,
    /// Streaming client state, `idle` if no client was started.
    pub state: ConnectionState,
    /// Latest price, if any.
    pub price: Option<f64>,
    /// Ticks currently held.
    pub points: usize,
}

/// Full series response.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    /// Asset identifier.
    pub asset: AssetId,
    /// `waiting` until the first tick, then `live`.
    pub status: SeriesStatus,
    /// Requested window in seconds, absent for the full series.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_secs: Option<u64>,
    /// Ticks, oldest first.
    pub points: Vec<Tick>,
    /// Statistics over `points`.
    pub summary: Option<SeriesSummary>,
    /// Streaming client status.
    pub connection: Option<StatusReport>,
}

/// Query parameters of the history endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct HistoryQuery {
    /// Keep only ticks newer than this many seconds.
    pub window_secs: Option<u64>,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Per-asset feed status.
    pub feeds: Vec<FeedInfo>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every feed is streaming.
    Healthy,
    /// Some feeds are streaming.
    Degraded,
    /// No feed is streaming.
    Unhealthy,
}

/// Feed status of one asset.
#[derive(Debug, Clone, Serialize)]
pub struct FeedInfo {
    /// Asset identifier.
    pub asset: AssetId,
    /// Connection state.
    pub state: ConnectionState,
    /// Whether the feed is streaming.
    pub connected: bool,
    /// Messages received.
    pub messages_received: u64,
    /// Consecutive reconnect attempts.
    pub reconnect_attempts: u32,
    /// Ticks currently held.
    pub points: usize,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the HTTP server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    tracker: Arc<AssetTracker>,
}

impl HealthServerState {
    /// Create new server state.
    #[must_use]
    pub fn new(version: String, tracker: Arc<AssetTracker>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            tracker,
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// Build the router with every endpoint.
#[must_use]
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/assets", get(assets_handler))
        .route("/assets/{asset}/history", get(history_handler))
        .route("/assets/{asset}/price", get(price_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Read API and health HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn assets_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    Json(asset_overviews(&state.tracker))
}

async fn history_handler(
    State(state): State<Arc<HealthServerState>>,
    Path(raw): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let asset = match AssetId::new(&raw) {
        Ok(asset) => asset,
        Err(e) => return bad_asset(&e),
    };

    let store = state.tracker.store();
    let points = match query.window_secs {
        None => store.snapshot(&asset),
        Some(0) => return bad_request("window_secs must be positive"),
        Some(secs) => {
            let window = i64::try_from(secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .unwrap_or(chrono::Duration::MAX);
            let cutoff = Utc::now()
                .checked_sub_signed(window)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            store.snapshot_since(&asset, cutoff)
        }
    };

    // Waiting means no data at all; an empty window over a live series stays live.
    let status = if store.is_empty(&asset) {
        SeriesStatus::Waiting
    } else {
        SeriesStatus::Live
    };

    Json(HistoryResponse {
        summary: SeriesSummary::from_ticks(&points),
        connection: state.tracker.status(&asset).map(|s| s.report()),
        window_secs: query.window_secs,
        asset,
        status,
        points,
    })
    .into_response()
}

async fn price_handler(
    State(state): State<Arc<HealthServerState>>,
    Path(raw): Path<String>,
) -> Response {
    let asset = match AssetId::new(&raw) {
        Ok(asset) => asset,
        Err(e) => return bad_asset(&e),
    };

    match state.tracker.store().latest(&asset) {
        Some(tick) => Json(serde_json::json!({
            "asset": asset,
            "price": tick.price(),
            "timestamp": tick.timestamp(),
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "asset": asset,
                "status": SeriesStatus::Waiting,
            })),
        )
            .into_response(),
    }
}

fn bad_asset(error: &impl std::fmt::Display) -> Response {
    bad_request(&error.to_string())
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let store = state.tracker.store();
    let is_ready = store.assets().iter().any(|asset| !store.is_empty(asset));

    if is_ready {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

/// Tracked assets plus any asset that has stored data, sorted.
fn known_assets(tracker: &AssetTracker) -> Vec<AssetId> {
    let mut assets = tracker.tracked_assets();
    assets.extend(tracker.store().assets());
    assets.sort();
    assets.dedup();
    assets
}

fn asset_overviews(tracker: &AssetTracker) -> Vec<AssetOverview> {
    let store = tracker.store();
    known_assets(tracker)
        .into_iter()
        .map(|asset| AssetOverview {
            state: tracker
                .status(&asset)
                .map_or(ConnectionState::Idle, |s| s.state()),
            price: store.current_price(&asset),
            points: store.len(&asset),
            asset,
        })
        .collect()
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let store = state.tracker.store();
    let feeds: Vec<FeedInfo> = state
        .tracker
        .tracked_assets()
        .into_iter()
        .filter_map(|asset| {
            let report = state.tracker.status(&asset)?.report();
            Some(FeedInfo {
                state: report.state,
                connected: report.state == ConnectionState::Streaming,
                messages_received: report.messages_received,
                reconnect_attempts: report.reconnect_attempts,
                points: store.len(&asset),
                asset,
            })
        })
        .collect();

    HealthResponse {
        status: determine_health_status(&feeds),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feeds,
    }
}

fn determine_health_status(feeds: &[FeedInfo]) -> HealthStatus {
    let connected = feeds.iter().filter(|f| f.connected).count();

    match connected {
        0 => HealthStatus::Unhealthy,
        n if n == feeds.len() => HealthStatus::Healthy,
        _ => HealthStatus::Degraded,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
