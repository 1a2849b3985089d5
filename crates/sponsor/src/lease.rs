//! The per-(chain, sponsor) nonce lease.
//!
//! The lease record carries the nonce bookkeeping alongside the lease token,
//! so acquisition returns the stored `next_nonce` in the same round trip.
//! The lease is advisory mutual exclusion, not a queue: losing the race
//! fails fast and the caller decides when (and whether) to come back.

use std::{sync::Arc, time::Duration};

use keygate_store::{Key, KeyValueStore, LeaseError, LeaseGuard, LeaseKeeper, Record, Update};
use keygate_types::{Address, ChainId};
use serde_json::Value;

use crate::error::{Result, SponsorError};

const NEXT_NONCE_ATTR: &str = "next_nonce";
const LAST_NONCE_ATTR: &str = "last_nonce_used";
const LAST_TX_HASH_ATTR: &str = "last_tx_hash";
const LAST_ERROR_ATTR: &str = "last_error";

/// A held nonce lease.
#[derive(Debug)]
pub struct NonceLease {
    guard: LeaseGuard,
    chain_id: ChainId,
    sponsor: Address,
    next_nonce: Option<u64>,
}

impl NonceLease {
    /// The nonce the next transaction should use, when known.
    ///
    /// `None` means the store has no history for this sponsor yet; the
    /// caller must query the chain's pending nonce before building the
    /// transaction.
    #[must_use]
    pub fn next_nonce(&self) -> Option<u64> {
        self.next_nonce
    }

    /// Reconciles the stored nonce with a fresh pending-nonce query.
    ///
    /// The chain is authoritative: after a long lease gap the stored value
    /// can lag transactions submitted outside this system (or lose a crash
    /// window), so the resolved nonce is the maximum of the two. Returns the
    /// nonce to use.
    pub fn reconcile(&mut self, pending_from_chain: u64) -> u64 {
        let resolved = self.next_nonce.map_or(pending_from_chain, |stored| {
            if stored != pending_from_chain {
                tracing::info!(
                    stored,
                    pending_from_chain,
                    sponsor = self.sponsor.as_str(),
                    "stored nonce disagrees with chain, chain wins"
                );
            }
            stored.max(pending_from_chain)
        });
        self.next_nonce = Some(resolved);
        resolved
    }

    /// The chain this lease covers.
    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// The sponsor wallet this lease covers.
    #[must_use]
    pub fn sponsor(&self) -> &Address {
        &self.sponsor
    }
}

/// Acquires and settles nonce leases on the shared store.
#[derive(Clone)]
pub struct NonceLeaseManager {
    keeper: LeaseKeeper,
    lease_duration: Duration,
}

impl NonceLeaseManager {
    /// Creates a manager with the configured lease duration.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, lease_duration: Duration) -> Self {
        Self { keeper: LeaseKeeper::new(store), lease_duration }
    }

    fn lease_key(chain_id: ChainId, sponsor: &Address) -> Key {
        Key::new("sponsor#lease", format!("{chain_id}#{sponsor}"))
    }

    /// Acquires the nonce lease for `(chain_id, sponsor)`.
    ///
    /// Non-blocking: if another handler holds an unexpired lease this fails
    /// immediately with [`SponsorError::LeaseBusy`] — surface it as
    /// retry-later rather than retrying in a loop, or concurrent handlers
    /// will hammer the store.
    ///
    /// # Errors
    ///
    /// [`SponsorError::LeaseBusy`] under contention, [`SponsorError::Store`]
    /// on backend failure.
    pub async fn acquire(&self, chain_id: ChainId, sponsor: &Address) -> Result<NonceLease> {
        match self
            .keeper
            .try_acquire(&Self::lease_key(chain_id, sponsor), self.lease_duration)
            .await
        {
            Ok((guard, record)) => Ok(NonceLease {
                guard,
                chain_id,
                sponsor: sponsor.clone(),
                next_nonce: record.get_u64(NEXT_NONCE_ATTR),
            }),
            Err(LeaseError::Busy { .. }) => {
                Err(SponsorError::LeaseBusy { chain_id, sponsor: sponsor.clone() })
            },
            Err(LeaseError::Lost { key }) => Err(SponsorError::Store {
                source: keygate_store::StoreError::ConditionFailed { key },
            }),
            Err(LeaseError::Store { source }) => Err(SponsorError::Store { source }),
        }
    }

    /// Records a successful broadcast: advances the nonce, stores the tx
    /// hash, clears any prior error.
    ///
    /// # Errors
    ///
    /// [`SponsorError::NonceRegression`] if `next_nonce` does not advance
    /// past `nonce_used`; [`SponsorError::LeaseLost`] if another handler took
    /// the lease over (never silently advance someone else's state);
    /// [`SponsorError::Store`] on backend failure.
    pub async fn record_broadcast(
        &self,
        lease: &NonceLease,
        nonce_used: u64,
        tx_hash: &str,
        next_nonce: u64,
    ) -> Result<()> {
        if next_nonce <= nonce_used {
            return Err(SponsorError::NonceRegression { used: nonce_used, next: next_nonce });
        }
        // The stored nonce only ever increases; a caller that skipped
        // reconciliation cannot roll it back.
        if lease.next_nonce.is_some_and(|stored| next_nonce < stored) {
            return Err(SponsorError::NonceRegression { used: nonce_used, next: next_nonce });
        }

        let update = Update::new()
            .set(NEXT_NONCE_ATTR, next_nonce)
            .set(LAST_NONCE_ATTR, nonce_used)
            .set(LAST_TX_HASH_ATTR, tx_hash)
            .set(LAST_ERROR_ATTR, Value::Null);
        self.settle(lease, update).await?;
        tracing::debug!(
            sponsor = lease.sponsor.as_str(),
            nonce_used,
            next_nonce,
            tx_hash,
            "broadcast recorded"
        );
        Ok(())
    }

    /// Records a failed broadcast attempt without advancing the nonce, so
    /// the slot is not lost.
    ///
    /// # Errors
    ///
    /// [`SponsorError::LeaseLost`] if the lease was taken over;
    /// [`SponsorError::Store`] on backend failure.
    pub async fn record_failure(&self, lease: &NonceLease, error: &str) -> Result<()> {
        let update = Update::new().set(LAST_ERROR_ATTR, error);
        self.settle(lease, update).await?;
        tracing::debug!(sponsor = lease.sponsor.as_str(), error, "broadcast failure recorded");
        Ok(())
    }

    /// Releases the lease so the next handler can acquire immediately.
    ///
    /// Call on every exit path once the transaction intent is resolved —
    /// success and failure alike.
    ///
    /// # Errors
    ///
    /// [`SponsorError::LeaseLost`] if the lease was already taken over;
    /// [`SponsorError::Store`] on backend failure.
    pub async fn release(&self, lease: &NonceLease) -> Result<()> {
        match self.keeper.release(&lease.guard).await {
            Ok(()) => Ok(()),
            Err(LeaseError::Lost { .. }) => Err(SponsorError::LeaseLost {
                chain_id: lease.chain_id,
                sponsor: lease.sponsor.clone(),
            }),
            Err(LeaseError::Busy { key }) => Err(SponsorError::Store {
                source: keygate_store::StoreError::ConditionFailed { key },
            }),
            Err(LeaseError::Store { source }) => Err(SponsorError::Store { source }),
        }
    }

    /// Best-effort release for cleanup paths; failures are logged only.
    pub async fn release_quiet(&self, lease: &NonceLease) {
        self.keeper.release_quiet(&lease.guard).await;
    }

    /// Reads the lease record for diagnostics (last tx hash, last error).
    ///
    /// # Errors
    ///
    /// [`SponsorError::Store`] on backend failure.
    pub async fn inspect(&self, chain_id: ChainId, sponsor: &Address) -> Result<Option<Record>> {
        self.keeper
            .store()
            .get(&Self::lease_key(chain_id, sponsor))
            .await
            .map_err(|source| SponsorError::Store { source })
    }

    async fn settle(&self, lease: &NonceLease, update: Update) -> Result<Record> {
        match self.keeper.confirm(&lease.guard, update).await {
            Ok(record) => Ok(record),
            Err(LeaseError::Lost { .. }) => Err(SponsorError::LeaseLost {
                chain_id: lease.chain_id,
                sponsor: lease.sponsor.clone(),
            }),
            Err(LeaseError::Busy { key }) => Err(SponsorError::Store {
                source: keygate_store::StoreError::ConditionFailed { key },
            }),
            Err(LeaseError::Store { source }) => Err(SponsorError::Store { source }),
        }
    }
}
