//! Domain Layer - Core price history types.
//!
//! Pure types with no I/O: validated ticks, the bounded history store, and the
//! streaming client's connection state.

/// Asset identifiers and validated price ticks.
pub mod tick;

/// Bounded per-asset tick history.
pub mod history;

/// Streaming client lifecycle state.
pub mod connection;
