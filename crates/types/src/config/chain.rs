//! Chain and subgraph endpoint configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::types::ChainId;

/// Default expiry-getter probe list.
///
/// Membership contracts have shipped several expiry getter signatures over
/// the years; resolution tries them in order and the first successful decode
/// wins. Kept configurable because the contract ecosystem keeps evolving.
pub fn default_expiry_probes() -> Vec<String> {
    vec![
        "keyExpirationTimestampFor(address)".to_string(),
        "keyExpirationTimestampFor(uint256)".to_string(),
    ]
}

/// Endpoints and identifiers for one chain deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ChainConfig {
    /// EVM chain id requests are resolved against.
    #[schemars(with = "u64")]
    pub chain_id: ChainId,
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,
    /// Subgraph endpoint URL; when absent, resolution goes straight to chain.
    #[serde(default)]
    pub subgraph_url: Option<String>,
    /// Optional bearer token for the subgraph endpoint.
    #[serde(default)]
    pub subgraph_api_key: Option<String>,
    /// Ordered expiry-getter signatures to probe, first success wins.
    #[serde(default = "default_expiry_probes")]
    pub expiry_probes: Vec<String>,
}

impl ChainConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the RPC URL is empty or the
    /// probe list is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_url.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "rpc_url must not be empty".to_string(),
            });
        }
        if self.expiry_probes.is_empty() {
            return Err(ConfigError::Validation {
                message: "expiry_probes must list at least one signature".to_string(),
            });
        }
        if let Some(url) = &self.subgraph_url {
            if url.trim().is_empty() {
                return Err(ConfigError::Validation {
                    message: "subgraph_url must not be empty when set".to_string(),
                });
            }
        }
        Ok(())
    }
}
