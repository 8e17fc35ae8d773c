//! Feed Message Codec
//!
//! Turns inbound feed text into either a price or a specific reason the
//! message was unusable. The streaming client is the single call site that
//! decides store versus drop.
//!
//! # Formats
//!
//! - **Asset keyed** (`CoinCap` prices stream): `{"bitcoin":"67012.55"}`. May
//!   carry several assets; only the tracked asset's key is read.
//! - **Exchange ticker**: the first price field present, tried in order:
//!   `"c"` (Binance 24h ticker), `"price"` (Coinbase ticker), then
//!   `"data"."price"` (wrapped payloads).
//!
//! Prices may be JSON strings or numbers.

use serde_json::Value;

use crate::domain::tick::AssetId;

/// Inbound payload format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedFormat {
    /// Object keyed by asset identifier.
    #[default]
    AssetKeyed,
    /// Exchange ticker object with the price under `"c"`, `"price"` or `"data"."price"`.
    Ticker,
}

impl FeedFormat {
    /// Parse format from string. Unknown values fall back to `AssetKeyed`.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().replace('-', "_").as_str() {
            "ticker" | "binance_ticker" | "binance" | "coinbase" => Self::Ticker,
            _ => Self::AssetKeyed,
        }
    }

    /// Get the format name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AssetKeyed => "asset_keyed",
            Self::Ticker => "ticker",
        }
    }
}

/// Why a message produced no price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    /// Not valid JSON.
    #[error("invalid JSON")]
    InvalidJson,
    /// Valid JSON but not an object.
    #[error("payload is not a JSON object")]
    NotAnObject,
    /// Object without the expected price key.
    #[error("price key missing")]
    MissingKey,
    /// Price value is neither a number nor a numeric string, or is not finite.
    #[error("price is not numeric")]
    NotNumeric,
    /// Price is zero or negative.
    #[error("price is not positive")]
    NonPositive,
}

impl ParseFailure {
    /// Short label for metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::NotAnObject => "not_an_object",
            Self::MissingKey => "missing_key",
            Self::NotNumeric => "not_numeric",
            Self::NonPositive => "non_positive",
        }
    }
}

/// Result of parsing one feed message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedMessage {
    /// A finite, positive price for the tracked asset.
    Price(f64),
    /// Message to drop.
    Unparseable(ParseFailure),
}

/// Codec bound to one asset and payload format.
#[derive(Debug, Clone)]
pub struct PriceCodec {
    asset: AssetId,
    format: FeedFormat,
}

impl PriceCodec {
    /// Create a codec reading `asset`'s price in `format`.
    #[must_use]
    pub const fn new(asset: AssetId, format: FeedFormat) -> Self {
        Self { asset, format }
    }

    /// Asset this codec reads.
    #[must_use]
    pub const fn asset(&self) -> &AssetId {
        &self.asset
    }

    /// Parse one text message.
    #[must_use]
    pub fn decode(&self, text: &str) -> ParsedMessage {
        match self.extract(text) {
            Ok(price) => ParsedMessage::Price(price),
            Err(failure) => ParsedMessage::Unparseable(failure),
        }
    }

    fn extract(&self, text: &str) -> Result<f64, ParseFailure> {
        let value: Value =
            serde_json::from_str(text.trim()).map_err(|_| ParseFailure::InvalidJson)?;
        let object = value.as_object().ok_or(ParseFailure::NotAnObject)?;

        let raw = match self.format {
            FeedFormat::AssetKeyed => object.get(self.asset.as_str()),
            FeedFormat::Ticker => object
                .get("c")
                .or_else(|| object.get("price"))
                .or_else(|| object.get("data").and_then(|data| data.get("price"))),
        }
        .ok_or(ParseFailure::MissingKey)?;
        let price = numeric_value(raw).ok_or(ParseFailure::NotNumeric)?;

        if price <= 0.0 {
            return Err(ParseFailure::NonPositive);
        }

        Ok(price)
    }
}

/// Read a finite number from a JSON number or numeric string.
pub(crate) fn numeric_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;

    number.is_finite().then_some(number)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn coincap() -> PriceCodec {
        PriceCodec::new(AssetId::new("bitcoin").unwrap(), FeedFormat::AssetKeyed)
    }

    fn ticker() -> PriceCodec {
        PriceCodec::new(AssetId::new("bitcoin").unwrap(), FeedFormat::Ticker)
    }

    #[test_case(r#"{"bitcoin":"100"}"#, 100.0 ; "string price")]
    #[test_case(r#"{"bitcoin":100.25}"#, 100.25 ; "numeric price")]
    #[test_case(r#"{"ethereum":"3000","bitcoin":"67012.55"}"#, 67012.55 ; "multi asset payload")]
    #[test_case("  {\"bitcoin\":\" 5 \"}\n", 5.0 ; "surrounding whitespace")]
    fn asset_keyed_prices(text: &str, expected: f64) {
        assert_eq!(coincap().decode(text), ParsedMessage::Price(expected));
    }

    #[test_case("not json", ParseFailure::InvalidJson ; "garbage")]
    #[test_case(r#"["bitcoin","100"]"#, ParseFailure::NotAnObject ; "array")]
    #[test_case(r#""100""#, ParseFailure::NotAnObject ; "bare string")]
    #[test_case(r#"{"other":"5"}"#, ParseFailure::MissingKey ; "wrong key")]
    #[test_case(r#"{"bitcoin":"abc"}"#, ParseFailure::NotNumeric ; "non numeric string")]
    #[test_case(r#"{"bitcoin":null}"#, ParseFailure::NotNumeric ; "null price")]
    #[test_case(r#"{"bitcoin":"NaN"}"#, ParseFailure::NotNumeric ; "nan string")]
    #[test_case(r#"{"bitcoin":"inf"}"#, ParseFailure::NotNumeric ; "infinite string")]
    #[test_case(r#"{"bitcoin":"-1"}"#, ParseFailure::NonPositive ; "negative")]
    #[test_case(r#"{"bitcoin":0}"#, ParseFailure::NonPositive ; "zero")]
    fn asset_keyed_failures(text: &str, failure: ParseFailure) {
        assert_eq!(coincap().decode(text), ParsedMessage::Unparseable(failure));
    }

    #[test_case(r#"{"e":"24hrTicker","s":"BTCUSDT","c":"67012.55","o":"66000.00"}"#, 67012.55 ; "binance last price")]
    #[test_case(r#"{"type":"ticker","product_id":"BTC-USD","price":"64000.1"}"#, 64000.1 ; "coinbase ticker")]
    #[test_case(r#"{"data":{"price":"64000.1"}}"#, 64000.1 ; "nested data price")]
    #[test_case(r#"{"data":{"price":7}}"#, 7.0 ; "nested numeric price")]
    #[test_case(r#"{"c":"10","price":"20"}"#, 10.0 ; "binance field wins")]
    #[test_case(r#"{"price":"20","data":{"price":"30"}}"#, 20.0 ; "top level price before nested")]
    fn ticker_prices(text: &str, expected: f64) {
        assert_eq!(ticker().decode(text), ParsedMessage::Price(expected));
    }

    #[test_case(r#"{"result":null,"id":1}"#, ParseFailure::MissingKey ; "subscribe ack")]
    #[test_case(r#"{"type":"subscriptions","channels":[]}"#, ParseFailure::MissingKey ; "coinbase subscriptions")]
    #[test_case(r#"{"data":"pong"}"#, ParseFailure::MissingKey ; "data without price")]
    #[test_case(r#"{"price":"n/a"}"#, ParseFailure::NotNumeric ; "non numeric price")]
    #[test_case(r#"{"data":{"price":"-4"}}"#, ParseFailure::NonPositive ; "negative nested price")]
    fn ticker_failures(text: &str, failure: ParseFailure) {
        assert_eq!(ticker().decode(text), ParsedMessage::Unparseable(failure));
    }

    #[test]
    fn feed_format_parsing() {
        assert_eq!(
            FeedFormat::from_str_case_insensitive("binance-ticker"),
            FeedFormat::Ticker
        );
        assert_eq!(
            FeedFormat::from_str_case_insensitive("BINANCE"),
            FeedFormat::Ticker
        );
        assert_eq!(
            FeedFormat::from_str_case_insensitive("coinbase"),
            FeedFormat::Ticker
        );
        assert_eq!(
            FeedFormat::from_str_case_insensitive("asset_keyed"),
            FeedFormat::AssetKeyed
        );
        assert_eq!(
            FeedFormat::from_str_case_insensitive("unknown"),
            FeedFormat::AssetKeyed
        );
    }
}
