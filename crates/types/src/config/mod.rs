//! Configuration types for the Keygate core.
//!
//! Configuration is loaded from TOML files and environment variables.
//! All config structs validate their values at construction time via
//! fallible builders. Post-deserialization validation is available via
//! the `validate()` method on each struct.

// The schemars `JsonSchema` derive macro internally uses `.unwrap()` in its
// expansions. Allow it at the module level since config types are declarative
// structs with minimal procedural code.
#![allow(clippy::disallowed_methods)]

mod chain;
mod membership;
mod resilience;
mod roster;
mod sponsor;

pub use chain::*;
pub use membership::*;
pub use resilience::*;
pub use roster::*;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
pub use sponsor::*;

use crate::tier::TierConfig;

/// Configuration validation error.
///
/// Returned when a configuration value is outside its valid range or
/// violates a cross-field constraint.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// Configuration sources could not be read.
    #[snafu(display("failed to load config: {message}"))]
    Load {
        /// Description of the load failure.
        message: String,
    },

    /// Configuration sources could not be deserialized.
    #[snafu(display("failed to parse config: {message}"))]
    Parse {
        /// Description of the parse failure.
        message: String,
    },
}

/// Duration serialization using humantime format (`"30s"`, `"5m"`).
pub(crate) mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// Aggregated configuration for the Keygate core.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CoreConfig {
    /// Configured membership tiers.
    #[serde(default)]
    pub tiers: Vec<TierConfig>,
    /// Chain and subgraph endpoints.
    pub chain: ChainConfig,
    /// Membership state service settings.
    #[serde(default)]
    pub membership: MembershipConfig,
    /// Roster cache settings.
    #[serde(default)]
    pub roster: RosterCacheConfig,
    /// Sponsored-transaction settings.
    #[serde(default)]
    pub sponsor: SponsorConfig,
    /// Upstream retry policy.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl CoreConfig {
    /// Loads configuration from an optional TOML file plus environment
    /// overrides.
    ///
    /// Environment variables use the `KEYGATE__` prefix with `__` as the
    /// nesting separator (e.g. `KEYGATE__ROSTER__PAGE_SIZE=100`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] / [`ConfigError::Parse`] for source
    /// failures and [`ConfigError::Validation`] if any section fails its
    /// range checks.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let builder = config::Config::builder();

        let builder = if let Some(path) = path {
            builder.add_source(config::File::with_name(path))
        } else {
            builder.add_source(config::File::with_name("keygate").required(false))
        };

        let builder = builder.add_source(
            config::Environment::with_prefix("KEYGATE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| ConfigError::Load { message: e.to_string() })?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| ConfigError::Parse { message: e.to_string() })?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError::Validation`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chain.validate()?;
        self.membership.validate()?;
        self.roster.validate()?;
        self.sponsor.validate()?;
        self.retry.validate()?;

        let mut seen = std::collections::HashSet::new();
        for tier in &self.tiers {
            if !seen.insert(tier.id.as_str()) {
                return Err(ConfigError::Validation {
                    message: format!("duplicate tier id: {}", tier.id),
                });
            }
        }
        Ok(())
    }
}
