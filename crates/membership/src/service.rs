//! The membership state service.

use std::sync::Arc;

use keygate_client::{ChainReader, IndexedKey, KeyIndex};
use keygate_types::{
    Address, AddressSet, ChainId, Snapshot, TierState,
    config::MembershipConfig,
    epoch_ms_now,
    membership::derive_status,
    tier::{TierConfig, tiers_fingerprint},
};

use crate::cache::SnapshotCache;

/// Resolves per-tier membership state for wallet address sets.
///
/// One service instance serves one chain. All network calls are read-only;
/// the only side effect is the process-local snapshot cache.
pub struct MembershipService {
    chain: Arc<dyn ChainReader>,
    index: Option<Arc<dyn KeyIndex>>,
    tiers: Vec<TierConfig>,
    chain_id: ChainId,
    fingerprint: String,
    cache: SnapshotCache,
    max_concurrency: u32,
}

impl MembershipService {
    /// Creates a service over the given sources and tier configuration.
    ///
    /// Passing `index: None` (no subgraph configured) sends every resolution
    /// straight to the chain.
    #[must_use]
    pub fn new(
        chain: Arc<dyn ChainReader>,
        index: Option<Arc<dyn KeyIndex>>,
        tiers: Vec<TierConfig>,
        chain_id: ChainId,
        config: &MembershipConfig,
    ) -> Self {
        let fingerprint = tiers_fingerprint(&tiers);
        Self {
            chain,
            index,
            tiers,
            chain_id,
            fingerprint,
            cache: SnapshotCache::new(config.snapshot_ttl),
            max_concurrency: config.max_concurrency,
        }
    }

    /// The configured tiers, in configuration order.
    #[must_use]
    pub fn tiers(&self) -> &[TierConfig] {
        &self.tiers
    }

    /// The chain this service resolves against.
    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// The tier-configuration fingerprint snapshots are stamped with.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Concurrency cap for callers fanning out over many address sets.
    #[must_use]
    pub fn max_concurrency(&self) -> u32 {
        self.max_concurrency
    }

    /// Resolves the membership snapshot for an address set.
    ///
    /// Serves from the process-local cache within its TTL unless
    /// `force_refresh` is set, in which case the cache entry is bypassed and
    /// overwritten. Individual tier resolution failures degrade to a `none`
    /// state for that tier; this method itself cannot fail.
    pub async fn get_state(&self, addresses: &AddressSet, force_refresh: bool) -> Snapshot {
        if !force_refresh {
            if let Some(hit) = self.cache.get(addresses, self.chain_id) {
                return hit;
            }
        }

        let mut tiers = Vec::with_capacity(self.tiers.len());
        for tier in &self.tiers {
            tiers.push(self.resolve_tier(tier, addresses).await);
        }

        let snapshot = Snapshot {
            chain_id: self.chain_id,
            tiers,
            resolved_at_ms: epoch_ms_now(),
            tiers_fingerprint: self.fingerprint.clone(),
        };
        self.cache.insert(addresses, self.chain_id, snapshot.clone());
        snapshot
    }

    /// Drops cached snapshots that overlap the given addresses.
    ///
    /// Call after any flow known to change on-chain membership state (a
    /// purchase, a renewal, a key transfer).
    pub fn invalidate(&self, addresses: &AddressSet) {
        self.cache.invalidate(addresses, self.chain_id);
    }

    /// Cache statistics, for diagnostics.
    #[must_use]
    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }

    /// Resolves one tier for the address set.
    ///
    /// Per address: subgraph first (when configured), chain fallback on miss
    /// or failure; expiry through the configured probe list unless the tier
    /// never expires; validity flag as the last resort. Every upstream
    /// failure is absorbed — an unresolvable tier is a `none` tier.
    async fn resolve_tier(&self, tier: &TierConfig, addresses: &AddressSet) -> TierState {
        let contract = &tier.contract_address;
        let mut token_ids = Vec::new();
        let mut owner_addresses: Vec<Address> = Vec::new();
        let mut best_expiry: Option<u64> = None;
        let mut any_valid = false;

        for owner in addresses.addresses() {
            let indexed = self.lookup_indexed(contract, owner).await;

            let (token, token_owner, mut expiry) = match indexed {
                Some(key) => (Some(key.token_id), Some(key.owner), key.expiration),
                None => {
                    let token = self.first_token_on_chain(contract, owner).await;
                    (token, token.map(|_| owner.clone()), None)
                },
            };

            if expiry.is_none() && !tier.never_expires {
                match self.chain.key_expiry(contract, owner, token).await {
                    Ok(found) => expiry = found,
                    Err(e) => {
                        tracing::debug!(
                            tier = tier.id.as_str(),
                            owner = owner.as_str(),
                            error = %e,
                            "expiry resolution failed"
                        );
                    },
                }
            }

            if expiry.is_none() && !any_valid {
                match self.chain.has_valid_key(contract, owner).await {
                    Ok(valid) => any_valid = any_valid || valid,
                    Err(e) => {
                        tracing::debug!(
                            tier = tier.id.as_str(),
                            owner = owner.as_str(),
                            error = %e,
                            "validity check failed"
                        );
                    },
                }
            }

            if let Some(token) = token {
                token_ids.push(token);
                if let Some(token_owner) = token_owner {
                    owner_addresses.push(token_owner);
                }
            }
            best_expiry = best_expiry.max(expiry);
        }

        let now_s = u64::try_from(epoch_ms_now() / 1000).unwrap_or(0);
        TierState {
            tier_id: tier.id.clone(),
            status: derive_status(best_expiry, any_valid, now_s),
            expiry_epoch_s: best_expiry,
            token_ids,
            owner_addresses,
        }
    }

    /// Subgraph lookup; `None` on miss, unconfigured index, or failure.
    async fn lookup_indexed(&self, contract: &Address, owner: &Address) -> Option<IndexedKey> {
        let index = self.index.as_ref()?;
        match index.latest_key(contract, owner).await {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!(
                    contract = contract.as_str(),
                    owner = owner.as_str(),
                    error = %e,
                    "subgraph lookup failed, falling back to chain"
                );
                None
            },
        }
    }

    /// First token the chain reports for `owner`, or `None` on zero balance
    /// or failure.
    async fn first_token_on_chain(
        &self,
        contract: &Address,
        owner: &Address,
    ) -> Option<keygate_types::TokenId> {
        match self.chain.balance_of(contract, owner).await {
            Ok(0) => None,
            Ok(_) => match self.chain.token_of_owner_by_index(contract, owner, 0).await {
                Ok(token) => Some(token),
                Err(e) => {
                    tracing::debug!(
                        contract = contract.as_str(),
                        owner = owner.as_str(),
                        error = %e,
                        "token enumeration failed"
                    );
                    None
                },
            },
            Err(e) => {
                tracing::debug!(
                    contract = contract.as_str(),
                    owner = owner.as_str(),
                    error = %e,
                    "balance check failed"
                );
                None
            },
        }
    }
}
