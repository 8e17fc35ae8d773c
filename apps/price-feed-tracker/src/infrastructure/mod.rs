//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports, plus the HTTP surface
//! and process-wide concerns (configuration, logging, metrics).

/// WebSocket feed transport, codec and streaming client.
pub mod feed;

/// REST seed price adapter.
pub mod seed;

/// Configuration loaded from the environment.
pub mod config;

/// Read API, health and metrics HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and optional OpenTelemetry tracing.
pub mod telemetry;
