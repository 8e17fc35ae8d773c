//! Configuration Module
//!
//! Environment-driven configuration for the tracker service.

mod settings;

pub use settings::{
    ConfigError, FeedSettings, ReconnectSettings, SeedSettings, ServerSettings, TrackerConfig,
};
