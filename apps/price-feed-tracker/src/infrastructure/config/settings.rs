//! Tracker Configuration Settings
//!
//! Configuration types for the tracker, loaded from environment variables.
//! Every value has a default. Malformed numbers fall back to the default,
//! except the asset list, the history bound, the reconnect delay and the seed
//! timeout, which are validated.

use std::time::Duration;

use crate::domain::history::DEFAULT_MAX_HISTORY_POINTS;
use crate::domain::tick::AssetId;
use crate::infrastructure::feed::{
    DEFAULT_FEED_URL, FeedFormat, HeartbeatConfig, ReconnectConfig, StreamingClientConfig,
};
use crate::infrastructure::seed::{DEFAULT_SEED_BASE_URL, DEFAULT_SEED_TIMEOUT};

const DEFAULT_ASSETS: &str = "bitcoin";

/// Feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// WebSocket URL template, `{asset}` is substituted per asset.
    pub url_template: String,
    /// Inbound payload format.
    pub format: FeedFormat,
    /// Text frame sent after connecting, `{asset}` is substituted.
    pub subscribe_message: Option<String>,
    /// Ping interval (zero disables the heartbeat).
    pub heartbeat_interval: Duration,
    /// Silence after which the connection is restarted.
    pub heartbeat_timeout: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        let heartbeat = HeartbeatConfig::default();
        Self {
            url_template: DEFAULT_FEED_URL.to_string(),
            format: FeedFormat::default(),
            subscribe_message: None,
            heartbeat_interval: heartbeat.ping_interval,
            heartbeat_timeout: heartbeat.idle_timeout,
        }
    }
}

/// Reconnection settings.
#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Maximum consecutive attempts (0 = unlimited).
    pub max_attempts: u32,
    /// Random jitter fraction applied to the delay.
    pub jitter: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        let reconnect = ReconnectConfig::default();
        Self {
            delay: reconnect.delay,
            max_attempts: reconnect.max_attempts,
            jitter: reconnect.jitter_factor,
        }
    }
}

/// Seed fetch settings.
#[derive(Debug, Clone)]
pub struct SeedSettings {
    /// Whether empty series are seeded before streaming.
    pub enabled: bool,
    /// REST base URL.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for SeedSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_SEED_BASE_URL.to_string(),
            timeout: DEFAULT_SEED_TIMEOUT,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Read API, health and metrics HTTP port.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8080 }
    }
}

/// Complete tracker configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Assets to track, deduplicated in configured order.
    pub assets: Vec<AssetId>,
    /// Series bound per asset.
    pub history_max_points: usize,
    /// Feed settings.
    pub feed: FeedSettings,
    /// Reconnection settings.
    pub reconnect: ReconnectSettings,
    /// Seed settings.
    pub seed: SeedSettings,
    /// Server settings.
    pub server: ServerSettings,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            assets: parse_assets(DEFAULT_ASSETS).unwrap_or_default(),
            history_max_points: DEFAULT_MAX_HISTORY_POINTS,
            feed: FeedSettings::default(),
            reconnect: ReconnectSettings::default(),
            seed: SeedSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl TrackerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the asset list or history bound is invalid, or if
    /// the reconnect delay or seed timeout is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the asset list or history bound is invalid, or if
    /// the reconnect delay or seed timeout is zero.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);
        let defaults = Self::default();

        let assets = parse_assets(
            &env.get("TRACKED_ASSETS")
                .unwrap_or_else(|| DEFAULT_ASSETS.to_string()),
        )?;

        let history_max_points = match env.get("HISTORY_MAX_POINTS") {
            None => defaults.history_max_points,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "HISTORY_MAX_POINTS".to_string(),
                        value: raw,
                        reason: "must be a positive integer".to_string(),
                    });
                }
            },
        };

        let feed = FeedSettings {
            url_template: env
                .get("FEED_URL")
                .unwrap_or(defaults.feed.url_template),
            format: env
                .get("FEED_FORMAT")
                .map(|s| FeedFormat::from_str_case_insensitive(&s))
                .unwrap_or_default(),
            subscribe_message: env.get("FEED_SUBSCRIBE_MESSAGE"),
            heartbeat_interval: env.duration_secs(
                "HEARTBEAT_INTERVAL_SECS",
                defaults.feed.heartbeat_interval,
            ),
            heartbeat_timeout: env
                .duration_secs("HEARTBEAT_TIMEOUT_SECS", defaults.feed.heartbeat_timeout),
        };

        let reconnect = ReconnectSettings {
            delay: env
                .positive_duration_secs("RECONNECT_DELAY_SECS", defaults.reconnect.delay)?,
            max_attempts: env.parse("RECONNECT_MAX_ATTEMPTS", defaults.reconnect.max_attempts),
            jitter: env
                .parse("RECONNECT_JITTER", defaults.reconnect.jitter)
                .clamp(0.0, 1.0),
        };

        let seed = SeedSettings {
            enabled: env.bool("SEED_ENABLED", defaults.seed.enabled),
            base_url: env.get("SEED_BASE_URL").unwrap_or(defaults.seed.base_url),
            timeout: env.positive_duration_secs("SEED_TIMEOUT_SECS", defaults.seed.timeout)?,
        };

        let server = ServerSettings {
            http_port: env.parse("TRACKER_HTTP_PORT", defaults.server.http_port),
        };

        Ok(Self {
            assets,
            history_max_points,
            feed,
            reconnect,
            seed,
            server,
        })
    }

    /// Streaming client configuration with the `{asset}` placeholders left in.
    #[must_use]
    pub fn client_template(&self) -> StreamingClientConfig {
        StreamingClientConfig {
            url: self.feed.url_template.clone(),
            format: self.feed.format,
            subscribe_message: self.feed.subscribe_message.clone(),
            reconnect: ReconnectConfig {
                delay: self.reconnect.delay,
                jitter_factor: self.reconnect.jitter,
                max_attempts: self.reconnect.max_attempts,
            },
            heartbeat: HeartbeatConfig::new(
                self.feed.heartbeat_interval,
                self.feed.heartbeat_timeout,
            ),
        }
    }

    /// Streaming client configuration for one asset.
    #[must_use]
    pub fn streaming_config(&self, asset: &AssetId) -> StreamingClientConfig {
        self.client_template().for_asset(asset)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A validated variable has an unusable value.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Asset list is empty.
    #[error("TRACKED_ASSETS must name at least one asset")]
    NoAssets,
}

fn parse_assets(raw: &str) -> Result<Vec<AssetId>, ConfigError> {
    let mut assets: Vec<AssetId> = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let asset = AssetId::new(part).map_err(|e| ConfigError::InvalidValue {
            key: "TRACKED_ASSETS".to_string(),
            value: part.to_string(),
            reason: e.to_string(),
        })?;
        if !assets.contains(&asset) {
            assets.push(asset);
        }
    }

    if assets.is_empty() {
        return Err(ConfigError::NoAssets);
    }
    Ok(assets)
}

/// Lookup wrapper; blank values count as unset.
struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    /// Like `duration_secs`, but an explicit zero is an error.
    fn positive_duration_secs(
        &self,
        key: &str,
        default: Duration,
    ) -> Result<Duration, ConfigError> {
        match self.get(key) {
            Some(raw) if raw.trim().parse::<u64>() == Ok(0) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
                reason: "must be at least one second".to_string(),
            }),
            _ => Ok(self.duration_secs(key, default)),
        }
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.trim().to_lowercase()).as_deref() {
            Some("true" | "1" | "yes" | "on") => true,
            Some("false" | "0" | "no" | "off") => false,
            _ => default,
        }
    }
}
