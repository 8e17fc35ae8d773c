//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the asset tracking service and the port interfaces
//! that decouple it from the network.

/// Port interfaces for external systems (feed transport, seed quotes, delays).
pub mod ports;

/// Application services for asset tracking.
pub mod services;
