//! REST Seed Adapter
//!
//! `SeedSource` backed by the `CoinCap` assets endpoint:
//! `GET {base}/v2/assets/{asset}` answering `{"data":{"priceUsd":"67012.55"}}`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::application::ports::{SeedError, SeedSource};
use crate::domain::tick::AssetId;
use crate::infrastructure::feed::codec::numeric_value;

/// Default REST base URL.
pub const DEFAULT_SEED_BASE_URL: &str = "https://api.coincap.io";

/// Default request timeout.
pub const DEFAULT_SEED_TIMEOUT: Duration = Duration::from_secs(5);

/// One-shot REST price quote.
#[derive(Debug, Clone)]
pub struct RestSeedSource {
    client: reqwest::Client,
    base_url: String,
}

impl RestSeedSource {
    /// Create a new adapter.
    ///
    /// # Errors
    ///
    /// Returns `SeedError::Request` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SeedError::Request(e.to_string()))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn asset_url(&self, asset: &AssetId) -> String {
        format!("{}/v2/assets/{}", self.base_url, asset)
    }
}

#[async_trait]
impl SeedSource for RestSeedSource {
    async fn fetch_price(&self, asset: &AssetId) -> Result<f64, SeedError> {
        let url = self.asset_url(asset);
        tracing::debug!(asset = %asset, url = %url, "Fetching seed price");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SeedError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SeedError::Status {
                status: status.as_u16(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SeedError::Malformed(e.to_string()))?;

        extract_price_usd(&body)
    }
}

fn extract_price_usd(body: &Value) -> Result<f64, SeedError> {
    let raw = body
        .get("data")
        .and_then(|data| data.get("priceUsd"))
        .ok_or_else(|| SeedError::Malformed("missing data.priceUsd".to_string()))?;

    numeric_value(raw).ok_or_else(|| SeedError::Malformed(format!("priceUsd not numeric: {raw}")))
}
