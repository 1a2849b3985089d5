//! Subgraph indexer client.
//!
//! The subgraph answers "latest key for this owner in this lock" with one
//! indexed query instead of a chain scan. It lags the chain and can be down,
//! so it is best-effort by contract: callers always keep the direct chain
//! read as fallback, and a subgraph miss is an answer, not an error.

use async_trait::async_trait;
use keygate_types::{
    Address, TokenId,
    config::RetryPolicy,
};
use serde_json::{Value, json};

use crate::{
    error::{ClientError, Result},
    retry::with_retry,
};

/// A key row as reported by the indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedKey {
    /// The key's token id.
    pub token_id: TokenId,
    /// The address that owns the key.
    pub owner: Address,
    /// Expiry in epoch seconds, when indexed.
    pub expiration: Option<u64>,
}

/// Indexed lookup of membership keys.
///
/// Seam for the membership service; production uses [`SubgraphClient`],
/// tests use a scripted fake.
#[async_trait]
pub trait KeyIndex: Send + Sync {
    /// The most recently created key owned by `owner` in `contract`, if the
    /// index knows one.
    async fn latest_key(&self, contract: &Address, owner: &Address)
        -> Result<Option<IndexedKey>>;
}

const LATEST_KEY_QUERY: &str = "
query LatestKey($owner: String!, $lock: String!) {
  keys(
    where: { owner: $owner, lock: $lock }
    orderBy: createdAtBlock
    orderDirection: desc
    first: 1
  ) {
    tokenId
    owner
    expiration
  }
}";

/// [`KeyIndex`] over a GraphQL HTTP endpoint.
pub struct SubgraphClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    policy: RetryPolicy,
}

impl SubgraphClient {
    /// Creates a client for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the HTTP client cannot be
    /// constructed.
    pub fn new(
        url: impl Into<String>,
        api_key: Option<String>,
        policy: RetryPolicy,
    ) -> Result<Self> {
        let url = url.into();
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ClientError::Transport { endpoint: url.clone(), message: e.to_string() })?;
        Ok(Self { http, url, api_key, policy })
    }

    async fn post_query(&self, query: &str, variables: Value) -> Result<Value> {
        let mut request = self
            .http
            .post(&self.url)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| ClientError::Transport {
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
            what: "subgraph response body".to_string(),
            message: e.to_string(),
        })?;

        if let Some(first) = payload.get("errors").and_then(|e| e.get(0)) {
            return Err(ClientError::Subgraph {
                message: first
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown graphql error")
                    .to_string(),
            });
        }

        payload.get("data").cloned().ok_or_else(|| ClientError::Decode {
            what: "subgraph response".to_string(),
            message: "missing data".to_string(),
        })
    }
}

#[async_trait]
impl KeyIndex for SubgraphClient {
    async fn latest_key(
        &self,
        contract: &Address,
        owner: &Address,
    ) -> Result<Option<IndexedKey>> {
        let variables = json!({ "owner": owner.as_str(), "lock": contract.as_str() });
        let data = with_retry(&self.policy, || {
            let variables = variables.clone();
            async move { self.post_query(LATEST_KEY_QUERY, variables).await }
        })
        .await?;

        let Some(row) = data.get("keys").and_then(|k| k.get(0)) else {
            return Ok(None);
        };
        parse_key_row(row).map(Some)
    }
}

/// Parses one key row from the indexer.
///
/// The indexer serializes numeric fields as decimal strings.
fn parse_key_row(row: &Value) -> Result<IndexedKey> {
    let token_id = row
        .get("tokenId")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<u64>().ok())
        .map(TokenId::new)
        .ok_or_else(|| ClientError::Decode {
            what: "subgraph key row".to_string(),
            message: "missing or malformed tokenId".to_string(),
        })?;

    let owner = row
        .get("owner")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::Decode {
            what: "subgraph key row".to_string(),
            message: "missing owner".to_string(),
        })
        .and_then(|s| {
            Address::parse(s).map_err(|e| ClientError::Decode {
                what: "subgraph key row".to_string(),
                message: e.to_string(),
            })
        })?;

    let expiration = row
        .get("expiration")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<u64>().ok());

    Ok(IndexedKey { token_id, owner, expiration })
}
