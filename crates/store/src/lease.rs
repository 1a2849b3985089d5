//! The expiring-lease primitive.
//!
//! There is no lock service in this system, so mutual exclusion is
//! reconstructed from conditional writes: a lease is a record holding an
//! opaque token and an expiry timestamp, acquired only when absent or
//! expired, and mutated only while the caller's token still matches.
//!
//! ```text
//! try_acquire ──► held (lease_id = token, lease_until = now + ttl)
//!                  │
//!                  ├─ confirm(update)   token still matches → apply
//!                  │                    token replaced      → Lost
//!                  │
//!                  └─ release           lease_until = 0, next acquirer
//!                                       need not wait out the ttl
//! ```
//!
//! A crashed holder never needs cleanup: the lease self-heals when
//! `lease_until` passes. Both the roster rebuild lock and the sponsor nonce
//! lease are instances of this one primitive, on disjoint key namespaces.

use std::{sync::Arc, time::Duration};

use keygate_types::epoch_ms_now;
use snafu::Snafu;
use uuid::Uuid;

use crate::{
    error::StoreError,
    kv::{Condition, Key, KeyValueStore, Update},
    record::Record,
};

/// Attribute holding the current holder's opaque token.
pub const LEASE_ID_ATTR: &str = "lease_id";

/// Attribute holding the lease expiry, epoch milliseconds.
pub const LEASE_UNTIL_ATTR: &str = "lease_until";

/// Errors from lease operations.
#[derive(Debug, Snafu)]
pub enum LeaseError {
    /// Another holder currently owns the lease.
    ///
    /// Expected under contention; callers surface this as retry-later and
    /// must not spin on it.
    #[snafu(display("lease at {key} is held by another caller"))]
    Busy {
        /// The contested lease key.
        key: Key,
    },

    /// The caller's token no longer matches the stored lease.
    ///
    /// This means the caller outlived its lease and somebody else took over;
    /// it indicates a logic bug (work exceeding the ttl) and must propagate,
    /// never be silently ignored.
    #[snafu(display("lease at {key} was taken over by another caller"))]
    Lost {
        /// The lease key.
        key: Key,
    },

    /// The store itself failed.
    #[snafu(display("lease store operation failed: {source}"))]
    Store {
        /// Underlying store error.
        source: StoreError,
    },
}

/// Proof of lease ownership, returned by [`LeaseKeeper::try_acquire`].
#[derive(Debug, Clone)]
pub struct LeaseGuard {
    /// The lease record's key.
    pub key: Key,
    /// The holder token written at acquisition.
    pub lease_id: String,
    /// Expiry written at acquisition, epoch milliseconds.
    pub lease_until_ms: i64,
}

/// Observed state of a lease record, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseView {
    /// Whether the lease is currently held (unexpired).
    pub held: bool,
    /// The stored expiry, epoch milliseconds.
    pub expires_at_ms: i64,
}

/// Acquires, confirms, and releases expiring leases on a shared store.
#[derive(Clone)]
pub struct LeaseKeeper {
    store: Arc<dyn KeyValueStore>,
}

impl LeaseKeeper {
    /// Creates a keeper over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The underlying store, for reads of domain attributes living on lease
    /// records.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Attempts to acquire the lease at `key` for `ttl`.
    ///
    /// Succeeds iff the record is absent, has never been leased, or the
    /// previous lease has expired. Non-blocking: losing the race fails
    /// immediately with [`LeaseError::Busy`] — there is no queue.
    ///
    /// Returns the guard plus the post-image record, so callers can read
    /// domain attributes stored alongside the lease (e.g. the sponsor's
    /// next nonce) without a second round trip.
    ///
    /// # Errors
    ///
    /// [`LeaseError::Busy`] when held; [`LeaseError::Store`] on backend
    /// failure.
    pub async fn try_acquire(
        &self,
        key: &Key,
        ttl: Duration,
    ) -> Result<(LeaseGuard, Record), LeaseError> {
        let now = epoch_ms_now();
        let lease_id = Uuid::new_v4().to_string();
        let lease_until_ms = now + i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        let condition = Condition::Or(vec![
            Condition::Absent(LEASE_UNTIL_ATTR.to_string()),
            Condition::NumberLessThan(LEASE_UNTIL_ATTR.to_string(), now),
        ]);
        let update = Update::new()
            .set(LEASE_ID_ATTR, lease_id.clone())
            .set(LEASE_UNTIL_ATTR, lease_until_ms);

        match self.store.conditional_update(key, update, condition).await {
            Ok(record) => {
                tracing::debug!(key = %key, lease_until_ms, "lease acquired");
                let guard = LeaseGuard { key: key.clone(), lease_id, lease_until_ms };
                Ok((guard, record))
            },
            Err(e) if e.is_condition_failure() => {
                tracing::debug!(key = %key, "lease busy");
                Err(LeaseError::Busy { key: key.clone() })
            },
            Err(source) => Err(LeaseError::Store { source }),
        }
    }

    /// Applies `update` to the lease record, conditioned on still holding it.
    ///
    /// # Errors
    ///
    /// [`LeaseError::Lost`] when the stored token no longer matches the
    /// guard's; [`LeaseError::Store`] on backend failure.
    pub async fn confirm(&self, guard: &LeaseGuard, update: Update) -> Result<Record, LeaseError> {
        let condition =
            Condition::Equals(LEASE_ID_ATTR.to_string(), guard.lease_id.clone().into());
        match self.store.conditional_update(&guard.key, update, condition).await {
            Ok(record) => Ok(record),
            Err(e) if e.is_condition_failure() => {
                tracing::error!(key = %guard.key, "lease ownership lost mid-operation");
                Err(LeaseError::Lost { key: guard.key.clone() })
            },
            Err(source) => Err(LeaseError::Store { source }),
        }
    }

    /// Releases the lease by zeroing its expiry, so the next acquirer need
    /// not wait out the remaining ttl.
    ///
    /// # Errors
    ///
    /// [`LeaseError::Lost`] when the lease was already taken over;
    /// [`LeaseError::Store`] on backend failure.
    pub async fn release(&self, guard: &LeaseGuard) -> Result<(), LeaseError> {
        self.confirm(guard, Update::new().set(LEASE_UNTIL_ATTR, 0)).await?;
        tracing::debug!(key = %guard.key, "lease released");
        Ok(())
    }

    /// Best-effort release for cleanup paths: failures are logged, never
    /// propagated. A lost or failed release only means the lease runs out
    /// its ttl naturally.
    pub async fn release_quiet(&self, guard: &LeaseGuard) {
        if let Err(e) = self.release(guard).await {
            tracing::warn!(key = %guard.key, error = %e, "best-effort lease release failed");
        }
    }

    /// Reads the lease record for diagnostics.
    ///
    /// Returns `None` when the record does not exist or was never leased.
    ///
    /// # Errors
    ///
    /// [`LeaseError::Store`] on backend failure.
    pub async fn view(&self, key: &Key) -> Result<Option<LeaseView>, LeaseError> {
        let record = self
            .store
            .get(key)
            .await
            .map_err(|source| LeaseError::Store { source })?;
        Ok(record
            .and_then(|r| r.get_i64(LEASE_UNTIL_ATTR))
            .map(|expires_at_ms| LeaseView {
                held: expires_at_ms > epoch_ms_now(),
                expires_at_ms,
            }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::MemoryStore;

    fn keeper() -> LeaseKeeper {
        LeaseKeeper::new(Arc::new(MemoryStore::new()))
    }

    fn key() -> Key {
        Key::new("roster#lock", "rebuild")
    }

    #[tokio::test]
    async fn acquire_then_busy() {
        let keeper = keeper();
        let (_guard, _) = keeper.try_acquire(&key(), Duration::from_secs(30)).await.unwrap();
        let second = keeper.try_acquire(&key(), Duration::from_secs(30)).await;
        assert!(matches!(second, Err(LeaseError::Busy { .. })));
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimable() {
        let keeper = keeper();
        let (_guard, _) = keeper.try_acquire(&key(), Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = keeper.try_acquire(&key(), Duration::from_secs(30)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn release_makes_lease_immediately_available() {
        let keeper = keeper();
        let (guard, _) = keeper.try_acquire(&key(), Duration::from_secs(300)).await.unwrap();
        keeper.release(&guard).await.unwrap();
        // No sleep: the zeroed expiry must satisfy the freshness predicate.
        let second = keeper.try_acquire(&key(), Duration::from_secs(30)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn confirm_after_takeover_reports_lost() {
        let keeper = keeper();
        let (stale_guard, _) =
            keeper.try_acquire(&key(), Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Someone else reclaims the expired lease.
        let (_fresh_guard, _) =
            keeper.try_acquire(&key(), Duration::from_secs(30)).await.unwrap();

        let result = stale_guard_confirm(&keeper, &stale_guard).await;
        assert!(matches!(result, Err(LeaseError::Lost { .. })));
    }

    async fn stale_guard_confirm(
        keeper: &LeaseKeeper,
        guard: &LeaseGuard,
    ) -> Result<Record, LeaseError> {
        keeper.confirm(guard, Update::new().set("marker", true)).await
    }

    #[tokio::test]
    async fn confirm_preserves_domain_attributes() {
        let keeper = keeper();
        let (guard, _) = keeper.try_acquire(&key(), Duration::from_secs(30)).await.unwrap();
        let record = keeper
            .confirm(&guard, Update::new().set("next_nonce", 7))
            .await
            .unwrap();
        assert_eq!(record.get_i64("next_nonce"), Some(7));
        assert_eq!(record.get_str(LEASE_ID_ATTR), Some(guard.lease_id.as_str()));
    }

    #[tokio::test]
    async fn exactly_one_of_many_racers_wins() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let keeper = LeaseKeeper::new(Arc::clone(&store));
            handles.push(tokio::spawn(async move {
                keeper
                    .try_acquire(&Key::new("sponsor#lease", "chain:1"), Duration::from_secs(30))
                    .await
                    .is_ok()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn view_reports_held_and_expiry() {
        let keeper = keeper();
        assert!(keeper.view(&key()).await.unwrap().is_none());

        let (guard, _) = keeper.try_acquire(&key(), Duration::from_secs(30)).await.unwrap();
        let view = keeper.view(&key()).await.unwrap().unwrap();
        assert!(view.held);
        assert_eq!(view.expires_at_ms, guard.lease_until_ms);

        keeper.release(&guard).await.unwrap();
        let view = keeper.view(&key()).await.unwrap().unwrap();
        assert!(!view.held);
    }
}
