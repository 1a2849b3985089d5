//! Sponsored-transaction configuration.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ConfigError, humantime_serde};
use crate::types::Address;

/// Default nonce lease duration.
fn default_lease_duration() -> Duration {
    Duration::from_secs(30)
}

/// Configuration for the sponsor wallet and its guardrails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SponsorConfig {
    /// Whether sponsored transactions are offered at all.
    #[serde(default)]
    pub enabled: bool,
    /// The sponsor wallet address. Required when `enabled`.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub sponsor_address: Option<Address>,
    /// Daily transaction budget. `None` disables the daily limit entirely.
    #[serde(default)]
    pub max_tx_per_day: Option<u32>,
    /// Advisory minimum sponsor balance in wei; below it, sponsoring should
    /// be reported unavailable. `None` disables the check.
    #[serde(default)]
    pub min_balance_wei: Option<u128>,
    /// How long a nonce lease is held before it self-expires.
    #[serde(default = "default_lease_duration", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub lease_duration: Duration,
}

impl Default for SponsorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sponsor_address: None,
            max_tx_per_day: None,
            min_balance_wei: None,
            lease_duration: default_lease_duration(),
        }
    }
}

impl SponsorConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `enabled` without an address,
    /// if the daily limit is zero, or if the lease duration is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.sponsor_address.is_none() {
            return Err(ConfigError::Validation {
                message: "sponsor_address is required when sponsor is enabled".to_string(),
            });
        }
        if self.max_tx_per_day == Some(0) {
            return Err(ConfigError::Validation {
                message: "max_tx_per_day must be >= 1 when set".to_string(),
            });
        }
        if self.lease_duration.is_zero() {
            return Err(ConfigError::Validation {
                message: "lease_duration must be > 0".to_string(),
            });
        }
        Ok(())
    }
}
