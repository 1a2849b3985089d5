//! Upstream retry policy.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ConfigError, humantime_serde};

/// Default maximum attempts (initial call + retries).
fn default_max_attempts() -> u32 {
    3
}

/// Default first backoff delay.
fn default_initial_backoff() -> Duration {
    Duration::from_millis(250)
}

/// Default backoff ceiling.
fn default_max_backoff() -> Duration {
    Duration::from_secs(5)
}

/// Default backoff multiplier per attempt.
fn default_multiplier() -> f64 {
    2.0
}

/// Default jitter factor (±25%).
fn default_jitter() -> f64 {
    0.25
}

/// Retry policy for rate-limited / temporarily-unavailable upstream calls.
///
/// Applied only to errors classified retryable (HTTP 429/503 and transport
/// timeouts); everything else propagates immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RetryPolicy {
    /// Total attempt budget, including the initial call. Must be >= 1.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub initial_backoff: Duration,
    /// Ceiling applied to the exponential backoff.
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    #[schemars(with = "String")]
    pub max_backoff: Duration,
    /// Backoff growth factor. Must be >= 1.0.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Jitter factor in `[0, 1]`; each delay is drawn uniformly from
    /// `[d * (1 - jitter), d * (1 + jitter)]`.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

#[bon::bon]
impl RetryPolicy {
    /// Creates a new retry policy with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    #[builder]
    pub fn new(
        #[builder(default = default_max_attempts())] max_attempts: u32,
        #[builder(default = default_initial_backoff())] initial_backoff: Duration,
        #[builder(default = default_max_backoff())] max_backoff: Duration,
        #[builder(default = default_multiplier())] multiplier: f64,
        #[builder(default = default_jitter())] jitter: f64,
    ) -> Result<Self, ConfigError> {
        let policy = Self { max_attempts, initial_backoff, max_backoff, multiplier, jitter };
        policy.validate()?;
        Ok(policy)
    }
}

impl RetryPolicy {
    /// Validates the policy values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Validation {
                message: "max_attempts must be >= 1".to_string(),
            });
        }
        if self.multiplier < 1.0 {
            return Err(ConfigError::Validation {
                message: "multiplier must be >= 1.0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Validation {
                message: "jitter must be within [0, 1]".to_string(),
            });
        }
        if self.max_backoff < self.initial_backoff {
            return Err(ConfigError::Validation {
                message: "max_backoff must be >= initial_backoff".to_string(),
            });
        }
        Ok(())
    }

    /// A single-attempt policy (no retries); useful in tests.
    #[must_use]
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            multiplier: 1.0,
            jitter: 0.0,
        }
    }
}
