//! Application configuration.
//!
//! Loaded from `config.toml` in the platform config directory; every field
//! has a default so a missing or partial file is never an error at this
//! layer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the Aside service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsideConfig {
    /// Deadline for each awaited engine event, in seconds.
    #[serde(default = "default_engine_timeout_secs")]
    pub engine_timeout_secs: u64,
    /// How long a fetched premium status snapshot stays fresh, in seconds.
    #[serde(default = "default_premium_cache_ttl_secs")]
    pub premium_cache_ttl_secs: u64,
    /// Completion endpoint URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_endpoint: Option<String>,
}

fn default_engine_timeout_secs() -> u64 {
    60
}

fn default_premium_cache_ttl_secs() -> u64 {
    300
}

impl Default for AsideConfig {
    fn default() -> Self {
        Self {
            engine_timeout_secs: default_engine_timeout_secs(),
            premium_cache_ttl_secs: default_premium_cache_ttl_secs(),
            engine_endpoint: None,
        }
    }
}

impl AsideConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml(text: &str) -> crate::error::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// The per-event engine deadline as a `Duration`.
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    /// The premium cache TTL as a `Duration`.
    pub fn premium_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.premium_cache_ttl_secs)
    }
}
