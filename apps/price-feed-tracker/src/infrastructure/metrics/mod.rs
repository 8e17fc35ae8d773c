//! Prometheus Metrics Module
//!
//! Exposes tracker metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Ticks**: ticks stored and rejected per asset
//! - **Messages**: feed messages dropped, by reason
//! - **Connections**: feed connection state and reconnects
//! - **Seeding**: seed fetch outcomes
//! - **Series**: current series length
//!
//! Recording before [`init_metrics`] is a no-op, so library code and tests
//! need no setup.
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::tick::AssetId;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if a different global recorder is already installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "price_tracker_ticks_appended_total",
        "Total ticks stored in the price history"
    );
    describe_counter!(
        "price_tracker_ticks_rejected_total",
        "Total ticks rejected by the store"
    );
    describe_counter!(
        "price_tracker_messages_dropped_total",
        "Total feed messages dropped as unparseable"
    );
    describe_counter!(
        "price_tracker_reconnects_total",
        "Total feed reconnection attempts"
    );
    describe_counter!(
        "price_tracker_transport_errors_total",
        "Total feed transport errors by type"
    );
    describe_counter!(
        "price_tracker_seed_attempts_total",
        "Total seed fetch attempts by outcome"
    );
    describe_gauge!(
        "price_tracker_series_length",
        "Number of ticks currently held per asset"
    );
    describe_gauge!(
        "price_tracker_feed_connected",
        "1 while the asset's feed is streaming, 0 otherwise"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for seed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// A seed tick was stored.
    Seeded,
    /// Series was already populated.
    Skipped,
    /// Fetch failed or timed out.
    Failed,
}

impl SeedOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Seeded => "seeded",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

/// Record a tick stored for an asset.
pub fn record_tick_appended(asset: &AssetId) {
    counter!(
        "price_tracker_ticks_appended_total",
        "asset" => asset.to_string()
    )
    .increment(1);
}

/// Record a tick rejected by the store.
pub fn record_tick_rejected(asset: &AssetId) {
    counter!(
        "price_tracker_ticks_rejected_total",
        "asset" => asset.to_string()
    )
    .increment(1);
}

/// Record a dropped feed message.
pub fn record_message_dropped(asset: &AssetId, reason: &'static str) {
    counter!(
        "price_tracker_messages_dropped_total",
        "asset" => asset.to_string(),
        "reason" => reason
    )
    .increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect(asset: &AssetId) {
    counter!(
        "price_tracker_reconnects_total",
        "asset" => asset.to_string()
    )
    .increment(1);
}

/// Record a transport error.
pub fn record_transport_error(asset: &AssetId, error_type: &'static str) {
    counter!(
        "price_tracker_transport_errors_total",
        "asset" => asset.to_string(),
        "error_type" => error_type
    )
    .increment(1);
}

/// Record the outcome of a seed attempt.
pub fn record_seed_attempt(asset: &AssetId, outcome: SeedOutcome) {
    counter!(
        "price_tracker_seed_attempts_total",
        "asset" => asset.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Update the series length gauge.
pub fn set_series_length(asset: &AssetId, len: usize) {
    #[allow(clippy::cast_precision_loss)]
    let len = len as f64;
    gauge!(
        "price_tracker_series_length",
        "asset" => asset.to_string()
    )
    .set(len);
}

/// Update the feed connection gauge.
pub fn set_feed_connected(asset: &AssetId, connected: bool) {
    gauge!(
        "price_tracker_feed_connected",
        "asset" => asset.to_string()
    )
    .set(if connected { 1.0 } else { 0.0 });
}

// =============================================================================
// Tests
// =============================================================================
