//! Runtime configuration.
//!
//! Layered load: an optional file source, then `TICKFEED_`-prefixed
//! environment overrides (e.g. `TICKFEED_DATABASE_URL`).

use std::time::Duration;

use serde::Deserialize;

use crate::market_data::types::DEFAULT_DEPTH;
use crate::market_data::worker::PollConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
    /// Levels kept per ladder side.
    #[serde(default = "default_depth")]
    pub depth: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    pub database_url: String,
    pub instruments: Vec<InstrumentConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentConfig {
    pub exchange: String,
    pub name: String,
    /// Exchange-native instrument code.
    pub code: String,
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_error_backoff_secs() -> u64 {
    5
}

fn default_depth() -> usize {
    DEFAULT_DEPTH
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl FeedConfig {
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder
            .add_source(config::Environment::with_prefix("TICKFEED").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn poll(&self) -> PollConfig {
        PollConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            error_backoff: Duration::from_secs(self.error_backoff_secs),
            depth: self.depth,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
