#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_precision_loss
    )
)]

//! Price Feed Tracker - Live Price History Service
//!
//! Keeps a bounded, in-memory history of live prices for a set of assets.
//! Each asset is seeded once from a REST quote, then fed by a long-lived
//! WebSocket stream that reconnects after a fixed delay whenever it drops.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: validated ticks, the bounded history store, connection state
//! - **Application**: ports (feed transport, seed quote, delay) and the
//!   `AssetTracker` service
//! - **Infrastructure**: WebSocket and REST adapters, streaming client,
//!   HTTP read API, configuration, telemetry and metrics
//!
//! # Data Flow
//!
//! ```text
//!  REST quote ──seed (once, if empty)──┐
//!                                      ▼
//!  WebSocket feed ──► StreamingClient ──► PriceHistoryStore ──► HTTP read API
//!        ▲                  │
//!        └── fixed delay ◄──┘ (on transport error)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core price history types with no I/O.
pub mod domain;

/// Application layer - Asset tracking service and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{ConnectionState, ConnectionStatus, StatusReport};
pub use domain::history::{DEFAULT_MAX_HISTORY_POINTS, PriceHistoryStore, SeriesSummary};
pub use domain::tick::{AssetId, AssetIdError, Tick, TickError};

// Application
pub use application::ports::{
    Delay, FeedConnection, FeedConnector, FeedFrame, SeedError, SeedSource, TransportError,
};
pub use application::services::AssetTracker;

// Feed client
pub use infrastructure::feed::{
    FeedFormat, HeartbeatConfig, PriceCodec, ReconnectConfig, StreamingClient,
    StreamingClientConfig, StreamingClientError, TokioDelay, WebSocketConnector,
};

// Seed adapter
pub use infrastructure::seed::RestSeedSource;

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, FeedSettings, ReconnectSettings, SeedSettings, ServerSettings, TrackerConfig,
};

// HTTP server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState, router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
