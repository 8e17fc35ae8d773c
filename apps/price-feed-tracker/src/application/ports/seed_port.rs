//! Seed Source Port (Driven Port)
//!
//! One-shot price quote used to populate an empty series before the stream
//! delivers its first tick.

use async_trait::async_trait;

use crate::domain::tick::AssetId;

/// Seed fetch error. Always non-fatal to the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SeedError {
    /// Request could not be sent or timed out.
    #[error("seed request failed: {0}")]
    Request(String),

    /// Endpoint answered with a non-success status.
    #[error("seed endpoint returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Body was missing the price or it was not numeric.
    #[error("malformed seed response: {0}")]
    Malformed(String),

    /// No answer within the seed timeout.
    #[error("seed fetch timed out after {0} ms")]
    Timeout(u128),
}

/// Port for fetching a single current price.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SeedSource: Send + Sync {
    /// Fetch the current USD price of `asset`.
    async fn fetch_price(&self, asset: &AssetId) -> Result<f64, SeedError>;
}
