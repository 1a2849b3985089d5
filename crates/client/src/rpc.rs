//! JSON-RPC chain read client.
//!
//! All methods are read-only (`eth_call` and account queries) and retried
//! under the deployment [`RetryPolicy`] for rate-limit and availability
//! errors only. The expiry getter walks an ordered, configurable list of
//! historical contract signatures; each probe is independently fallible and
//! the first successful decode wins.

use async_trait::async_trait;
use keygate_types::{
    Address, TokenId,
    config::{ChainConfig, RetryPolicy},
};
use serde_json::{Value, json};

use crate::{
    abi::{self, Arg, ProbeArg},
    error::{ClientError, Result},
    retry::with_retry,
};

/// Read-only access to membership contract state.
///
/// Seam for the membership service; production uses [`RpcClient`], tests use
/// a scripted fake.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Whether `owner` currently holds a valid key in `contract`.
    async fn has_valid_key(&self, contract: &Address, owner: &Address) -> Result<bool>;

    /// Number of keys `owner` holds in `contract`.
    async fn balance_of(&self, contract: &Address, owner: &Address) -> Result<u64>;

    /// Token id of `owner`'s key at `index`.
    async fn token_of_owner_by_index(
        &self,
        contract: &Address,
        owner: &Address,
        index: u64,
    ) -> Result<TokenId>;

    /// Key expiry in epoch seconds, resolved through the configured probe
    /// list. `None` when no probe resolves.
    async fn key_expiry(
        &self,
        contract: &Address,
        owner: &Address,
        token: Option<TokenId>,
    ) -> Result<Option<u64>>;

    /// The account's pending-inclusive transaction count (the next nonce).
    async fn pending_nonce(&self, address: &Address) -> Result<u64>;

    /// The account's balance in wei.
    async fn balance_wei(&self, address: &Address) -> Result<u128>;
}

/// [`ChainReader`] over JSON-RPC 2.0.
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    policy: RetryPolicy,
    expiry_probes: Vec<String>,
}

impl RpcClient {
    /// Creates a client for the given chain configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &ChainConfig, policy: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ClientError::Transport {
                endpoint: config.rpc_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            url: config.rpc_url.clone(),
            policy,
            expiry_probes: config.expiry_probes.clone(),
        })
    }

    /// Performs one JSON-RPC request without retry.
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::Transport {
                endpoint: self.url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http {
                endpoint: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let payload: Value = response.json().await.map_err(|e| ClientError::Decode {
            what: "rpc response body".to_string(),
            message: e.to_string(),
        })?;

        if let Some(error) = payload.get("error") {
            return Err(ClientError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }

        payload.get("result").cloned().ok_or_else(|| ClientError::Decode {
            what: "rpc response".to_string(),
            message: "missing result".to_string(),
        })
    }

    /// `eth_call` against `contract` with retry, returning the raw hex
    /// response.
    async fn eth_call(&self, contract: &Address, data: String) -> Result<String> {
        with_retry(&self.policy, || {
            let data = data.clone();
            async move {
                let result = self
                    .request(
                        "eth_call",
                        json!([{ "to": contract.as_str(), "data": data }, "latest"]),
                    )
                    .await?;
                result
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ClientError::Decode {
                        what: "eth_call result".to_string(),
                        message: "not a hex string".to_string(),
                    })
            }
        })
        .await
    }

    /// A retried quantity query (`eth_getTransactionCount`, `eth_getBalance`).
    async fn quantity(&self, method: &'static str, params: Value) -> Result<u128> {
        let result = with_retry(&self.policy, || {
            let params = params.clone();
            async move { self.request(method, params).await }
        })
        .await?;
        let text = result.as_str().ok_or_else(|| ClientError::Decode {
            what: method.to_string(),
            message: "not a hex quantity".to_string(),
        })?;
        parse_quantity(text)
    }
}

/// Parses a `0x`-prefixed JSON-RPC quantity.
fn parse_quantity(text: &str) -> Result<u128> {
    let stripped = text.strip_prefix("0x").unwrap_or(text);
    u128::from_str_radix(stripped, 16).map_err(|e| ClientError::Decode {
        what: "hex quantity".to_string(),
        message: format!("{text}: {e}"),
    })
}

#[async_trait]
impl ChainReader for RpcClient {
    async fn has_valid_key(&self, contract: &Address, owner: &Address) -> Result<bool> {
        let data = abi::encode_call("getHasValidKey(address)", &[Arg::Address(owner)]);
        let response = self.eth_call(contract, data).await?;
        abi::decode_bool(&response)
    }

    async fn balance_of(&self, contract: &Address, owner: &Address) -> Result<u64> {
        let data = abi::encode_call("balanceOf(address)", &[Arg::Address(owner)]);
        let response = self.eth_call(contract, data).await?;
        Ok(u64::try_from(abi::decode_uint(&response)?).unwrap_or(u64::MAX))
    }

    async fn token_of_owner_by_index(
        &self,
        contract: &Address,
        owner: &Address,
        index: u64,
    ) -> Result<TokenId> {
        let data = abi::encode_call(
            "tokenOfOwnerByIndex(address,uint256)",
            &[Arg::Address(owner), Arg::Uint(u128::from(index))],
        );
        let response = self.eth_call(contract, data).await?;
        abi::decode_token_id(&response)
    }

    async fn key_expiry(
        &self,
        contract: &Address,
        owner: &Address,
        token: Option<TokenId>,
    ) -> Result<Option<u64>> {
        for signature in &self.expiry_probes {
            let data = match abi::classify_probe(signature)? {
                ProbeArg::Address => abi::encode_call(signature, &[Arg::Address(owner)]),
                ProbeArg::TokenId => match token {
                    Some(token) => {
                        abi::encode_call(signature, &[Arg::Uint(u128::from(token.value()))])
                    },
                    // This probe needs a token id we don't have.
                    None => continue,
                },
            };

            match self.eth_call(contract, data).await.and_then(|r| abi::decode_uint(&r)) {
                Ok(value) => {
                    return Ok(Some(u64::try_from(value).unwrap_or(u64::MAX)));
                },
                Err(e) => {
                    tracing::debug!(
                        probe = signature.as_str(),
                        contract = contract.as_str(),
                        error = %e,
                        "expiry probe failed, trying next"
                    );
                },
            }
        }
        Ok(None)
    }

    async fn pending_nonce(&self, address: &Address) -> Result<u64> {
        let value = self
            .quantity(
                "eth_getTransactionCount",
                json!([address.as_str(), "pending"]),
            )
            .await?;
        Ok(u64::try_from(value).unwrap_or(u64::MAX))
    }

    async fn balance_wei(&self, address: &Address) -> Result<u128> {
        self.quantity("eth_getBalance", json!([address.as_str(), "latest"])).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_quantity_handles_prefixes() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1a").unwrap(), 26);
        assert!(parse_quantity("0xzz").is_err());
        assert!(parse_quantity("").is_err());
    }
}
