//! Delay Port (Driven Port)
//!
//! Suspension used between reconnect attempts.

use std::time::Duration;

use async_trait::async_trait;

/// Provider of the reconnect delay.
#[async_trait]
pub trait Delay: Send + Sync {
    /// Suspend the calling task for `duration`.
    async fn sleep(&self, duration: Duration);
}
