//! Programmable fakes for the upstream client traits.
//!
//! Both fakes support per-call failure injection (`fail_next`) so tests can
//! exercise the retry and fallback paths without a network.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use keygate_client::{ChainReader, ClientError, IndexedKey, KeyIndex, Result};
use keygate_types::{Address, TokenId};
use parking_lot::RwLock;

/// A scripted key holding for [`ScriptedChain`].
#[derive(Debug, Clone)]
pub struct ChainKey {
    /// Token id reported by enumeration.
    pub token_id: TokenId,
    /// Expiry reported by the probe walk.
    pub expiry: Option<u64>,
    /// Validity flag reported by `has_valid_key`.
    pub valid: bool,
}

/// Injects up to `n` retryable failures before answers resume.
fn take_failure(budget: &AtomicUsize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn unavailable(endpoint: &str) -> ClientError {
    ClientError::Http { endpoint: endpoint.to_string(), status: 503 }
}

/// Programmable [`ChainReader`].
#[derive(Default)]
pub struct ScriptedChain {
    keys: RwLock<HashMap<(Address, Address), ChainKey>>,
    nonces: RwLock<HashMap<Address, u64>>,
    balances: RwLock<HashMap<Address, u128>>,
    failures: AtomicUsize,
    calls: AtomicU64,
}

impl ScriptedChain {
    /// Creates an empty chain: every owner has zero keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a key holding for `(contract, owner)`.
    pub fn set_key(
        &self,
        contract: &Address,
        owner: &Address,
        token_id: TokenId,
        expiry: Option<u64>,
        valid: bool,
    ) {
        self.keys.write().insert(
            (contract.clone(), owner.clone()),
            ChainKey { token_id, expiry, valid },
        );
    }

    /// Removes a scripted key holding.
    pub fn clear_key(&self, contract: &Address, owner: &Address) {
        self.keys.write().remove(&(contract.clone(), owner.clone()));
    }

    /// Scripts the pending nonce for an account.
    pub fn set_pending_nonce(&self, address: &Address, nonce: u64) {
        self.nonces.write().insert(address.clone(), nonce);
    }

    /// Scripts the balance for an account.
    pub fn set_balance_wei(&self, address: &Address, wei: u128) {
        self.balances.write().insert(address.clone(), wei);
    }

    /// Makes the next `n` calls fail with a retryable 503.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Total calls served (including injected failures).
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn admit(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failures) {
            return Err(unavailable("scripted-chain"));
        }
        Ok(())
    }

    fn key(&self, contract: &Address, owner: &Address) -> Option<ChainKey> {
        self.keys.read().get(&(contract.clone(), owner.clone())).cloned()
    }
}

#[async_trait]
impl ChainReader for ScriptedChain {
    async fn has_valid_key(&self, contract: &Address, owner: &Address) -> Result<bool> {
        self.admit()?;
        Ok(self.key(contract, owner).is_some_and(|k| k.valid))
    }

    async fn balance_of(&self, contract: &Address, owner: &Address) -> Result<u64> {
        self.admit()?;
        Ok(u64::from(self.key(contract, owner).is_some()))
    }

    async fn token_of_owner_by_index(
        &self,
        contract: &Address,
        owner: &Address,
        _index: u64,
    ) -> Result<TokenId> {
        self.admit()?;
        self.key(contract, owner)
            .map(|k| k.token_id)
            .ok_or_else(|| ClientError::Rpc {
                code: -32000,
                message: "execution reverted: no key at index".to_string(),
            })
    }

    async fn key_expiry(
        &self,
        contract: &Address,
        owner: &Address,
        _token: Option<TokenId>,
    ) -> Result<Option<u64>> {
        self.admit()?;
        Ok(self.key(contract, owner).and_then(|k| k.expiry))
    }

    async fn pending_nonce(&self, address: &Address) -> Result<u64> {
        self.admit()?;
        Ok(self.nonces.read().get(address).copied().unwrap_or(0))
    }

    async fn balance_wei(&self, address: &Address) -> Result<u128> {
        self.admit()?;
        Ok(self.balances.read().get(address).copied().unwrap_or(0))
    }
}

/// Programmable [`KeyIndex`].
#[derive(Default)]
pub struct ScriptedSubgraph {
    keys: RwLock<HashMap<(Address, Address), IndexedKey>>,
    failures: AtomicUsize,
    calls: AtomicU64,
}

impl ScriptedSubgraph {
    /// Creates an empty index: every lookup is a miss.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the indexed key for `(contract, owner)`.
    pub fn set_key(&self, contract: &Address, owner: &Address, key: IndexedKey) {
        self.keys.write().insert((contract.clone(), owner.clone()), key);
    }

    /// Makes the next `n` lookups fail with a retryable 503.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Total lookups served (including injected failures).
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyIndex for ScriptedSubgraph {
    async fn latest_key(
        &self,
        contract: &Address,
        owner: &Address,
    ) -> Result<Option<IndexedKey>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failures) {
            return Err(unavailable("scripted-subgraph"));
        }
        Ok(self.keys.read().get(&(contract.clone(), owner.clone())).cloned())
    }
}
