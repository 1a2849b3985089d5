//! Roster cache configuration.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ConfigError, humantime_serde};

/// Default time-to-live before a cache entry stops being fresh.
fn default_ttl() -> Duration {
    Duration::from_secs(600)
}

/// Default maximum age at which a stale entry may still be served.
fn default_max_stale() -> Duration {
    Duration::from_secs(3600)
}

/// Default number of members per cache page.
fn default_page_size() -> u32 {
    100
}

/// Caching mode for the admin roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    /// No store interaction; every read recomputes.
    Off,
    /// Stale entries block the reader while being rebuilt synchronously.
    ReadThrough,
    /// Stale entries are served immediately while a background rebuild runs.
    #[default]
    StaleWhileRevalidate,
}

/// Configuration for the roster cache manager.
///
/// Staleness windows: an entry younger than `ttl` is *fresh*; between `ttl`
/// and `max_stale` it is *stale but usable* (mode decides whether the reader
/// blocks); beyond `max_stale` it is never served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RosterCacheConfig {
    /// Caching mode.
    #[serde(default)]
    pub mode: CacheMode,
    /// Freshness window.
    #[serde(default = "default_ttl", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub ttl: Duration,
    /// Hard staleness bound. Must be >= `ttl`.
    #[serde(default = "default_max_stale", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub max_stale: Duration,
    /// Members per cache page. Must be >= 1.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for RosterCacheConfig {
    fn default() -> Self {
        Self {
            mode: CacheMode::default(),
            ttl: default_ttl(),
            max_stale: default_max_stale(),
            page_size: default_page_size(),
        }
    }
}

#[bon::bon]
impl RosterCacheConfig {
    /// Creates a new roster cache configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `page_size` is zero or
    /// `max_stale < ttl`.
    #[builder]
    pub fn new(
        #[builder(default)] mode: CacheMode,
        #[builder(default = default_ttl())] ttl: Duration,
        #[builder(default = default_max_stale())] max_stale: Duration,
        #[builder(default = default_page_size())] page_size: u32,
    ) -> Result<Self, ConfigError> {
        let config = Self { mode, ttl, max_stale, page_size };
        config.validate()?;
        Ok(config)
    }
}

impl RosterCacheConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Validation {
                message: "page_size must be >= 1".to_string(),
            });
        }
        if self.max_stale < self.ttl {
            return Err(ConfigError::Validation {
                message: format!(
                    "max_stale ({:?}) must be >= ttl ({:?})",
                    self.max_stale, self.ttl
                ),
            });
        }
        Ok(())
    }

    /// True unless the mode is [`CacheMode::Off`].
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.mode != CacheMode::Off
    }
}
