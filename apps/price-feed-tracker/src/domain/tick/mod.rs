//! Price Tick Types
//!
//! Core value types for price observations: the asset identifier that keys
//! every series and feed payload, and the validated timestamped tick.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Asset Identifier
// =============================================================================

/// Identifier of a tracked asset (e.g. `bitcoin`).
///
/// Normalized to trimmed lowercase so that feed payload keys, seed endpoint
/// paths and store keys all agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Create a new asset identifier.
    ///
    /// # Errors
    ///
    /// Returns `AssetIdError` if the identifier is empty or contains
    /// whitespace or path separators.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, AssetIdError> {
        let normalized = raw.as_ref().trim().to_lowercase();

        if normalized.is_empty() {
            return Err(AssetIdError::Empty);
        }

        if normalized
            .chars()
            .any(|c| c.is_whitespace() || c == '/' || c == '?' || c == '&')
        {
            return Err(AssetIdError::InvalidCharacter(normalized));
        }

        Ok(Self(normalized))
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AssetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Asset identifier validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetIdError {
    /// Identifier was empty after trimming.
    #[error("asset identifier cannot be empty")]
    Empty,
    /// Identifier contains a character that cannot appear in a feed key or URL path.
    #[error("asset identifier contains invalid characters: {0}")]
    InvalidCharacter(String),
}

// =============================================================================
// Tick
// =============================================================================

/// One timestamped price observation.
///
/// The price is always finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    timestamp: DateTime<Utc>,
    price: f64,
}

impl Tick {
    /// Create a validated tick.
    ///
    /// # Errors
    ///
    /// Returns `TickError` if the price is not finite or not positive.
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Result<Self, TickError> {
        if !price.is_finite() {
            return Err(TickError::NotFinite);
        }
        if price <= 0.0 {
            return Err(TickError::NonPositive(price));
        }
        Ok(Self { timestamp, price })
    }

    /// Create a validated tick stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns `TickError` if the price is not finite or not positive.
    pub fn now(price: f64) -> Result<Self, TickError> {
        Self::new(Utc::now(), price)
    }

    /// When the price was observed (UTC).
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Observed price in USD.
    #[must_use]
    pub const fn price(&self) -> f64 {
        self.price
    }

    /// Whether this tick still satisfies the price invariant.
    ///
    /// Ticks built through [`Tick::new`] always do; deserialized ticks may not.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// Tick validation error.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum TickError {
    /// Price was NaN or infinite.
    #[error("price must be finite")]
    NotFinite,
    /// Price was zero or negative.
    #[error("price must be positive, got {0}")]
    NonPositive(f64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_id_normalizes() {
        let id = AssetId::new("  Bitcoin ").unwrap();
        assert_eq!(id.as_str(), "bitcoin");
        assert_eq!(id.to_string(), "bitcoin");
    }

    #[test]
    fn asset_id_rejects_empty() {
        assert_eq!(AssetId::new("   "), Err(AssetIdError::Empty));
    }

    #[test]
    fn asset_id_rejects_path_characters() {
        assert!(matches!(
            AssetId::new("bit/coin"),
            Err(AssetIdError::InvalidCharacter(_))
        ));
        assert!(matches!(
            AssetId::new("bit coin"),
            Err(AssetIdError::InvalidCharacter(_))
        ));
    }

    #[test]
    fn tick_accepts_positive_price() {
        let tick = Tick::now(100.5).unwrap();
        assert!((tick.price() - 100.5).abs() < f64::EPSILON);
        assert!(tick.is_valid());
    }

    #[test]
    fn tick_rejects_invalid_prices() {
        assert_eq!(Tick::now(0.0), Err(TickError::NonPositive(0.0)));
        assert_eq!(Tick::now(-1.0), Err(TickError::NonPositive(-1.0)));
        assert_eq!(Tick::now(f64::NAN), Err(TickError::NotFinite));
        assert_eq!(Tick::now(f64::INFINITY), Err(TickError::NotFinite));
    }

    #[test]
    fn tick_serializes_with_utc_timestamp() {
        let ts = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let tick = Tick::new(ts, 42.0).unwrap();
        let json = serde_json::to_value(tick).unwrap();
        assert_eq!(json["timestamp"], "2024-01-02T03:04:05Z");
        assert_eq!(json["price"], 42.0);
    }
}
