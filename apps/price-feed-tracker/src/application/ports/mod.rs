//! Port Interfaces
//!
//! Contracts that infrastructure adapters implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `FeedConnector` / `FeedConnection`: live tick feed transport
//! - `SeedSource`: one-shot REST price quote
//! - `Delay`: reconnect delay provider (swapped for an instant fake in tests)

mod delay_port;
mod feed_port;
mod seed_port;

pub use delay_port::Delay;
pub use feed_port::{FeedConnection, FeedConnector, FeedFrame, TransportError};
pub use seed_port::{SeedError, SeedSource};

#[cfg(test)]
pub use seed_port::MockSeedSource;
