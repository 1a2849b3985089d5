//! Membership state service configuration.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ConfigError, humantime_serde};

/// Default snapshot cache TTL.
fn default_snapshot_ttl() -> Duration {
    Duration::from_secs(60)
}

/// Default bound on concurrent per-user resolutions during roster builds.
fn default_max_concurrency() -> u32 {
    8
}

/// Configuration for the membership state service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MembershipConfig {
    /// How long a resolved snapshot stays servable from the process-local
    /// cache before a fresh resolution is required.
    #[serde(default = "default_snapshot_ttl", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub snapshot_ttl: Duration,
    /// Concurrency cap for the roster build fan-out; sized to respect
    /// RPC and indexer rate limits. Must be >= 1.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl: default_snapshot_ttl(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[bon::bon]
impl MembershipConfig {
    /// Creates a new membership configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `max_concurrency` is zero.
    #[builder]
    pub fn new(
        #[builder(default = default_snapshot_ttl())] snapshot_ttl: Duration,
        #[builder(default = default_max_concurrency())] max_concurrency: u32,
    ) -> Result<Self, ConfigError> {
        let config = Self { snapshot_ttl, max_concurrency };
        config.validate()?;
        Ok(config)
    }
}

impl MembershipConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Validation {
                message: "max_concurrency must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}
