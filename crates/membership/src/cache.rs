//! Process-local snapshot cache.
//!
//! Keyed by `(sorted address set, chain id)` so request handlers resolving
//! the same wallets within the TTL share one upstream fan-out. The cache is
//! created on first use by its owning service, entries expire independently,
//! and there is no teardown: expired entries are dropped lazily on access or
//! by an explicit purge.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use keygate_types::{AddressSet, ChainId, Snapshot};
use parking_lot::RwLock;

/// Cached entry with its insertion time.
#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: Snapshot,
    addresses: AddressSet,
    cached_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

/// Statistics about the cache, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently stored, including expired ones not yet dropped.
    pub len: usize,
    /// Stored entries past their TTL.
    pub expired: usize,
}

/// Thread-safe TTL cache for resolved membership snapshots.
#[derive(Debug)]
pub struct SnapshotCache {
    ttl: Duration,
    entries: RwLock<HashMap<(String, ChainId), CacheEntry>>,
}

impl SnapshotCache {
    /// Creates an empty cache with the given entry TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    /// Returns the cached snapshot for the address set, if present and
    /// within TTL. Expired entries are dropped on the way out.
    #[must_use]
    pub fn get(&self, addresses: &AddressSet, chain_id: ChainId) -> Option<Snapshot> {
        let key = (addresses.canonical_key(), chain_id);

        {
            let entries = self.entries.read();
            match entries.get(&key) {
                Some(entry) if !entry.is_expired(self.ttl) => {
                    return Some(entry.snapshot.clone());
                },
                Some(_) => {},
                None => return None,
            }
        }

        // Entry exists but expired; drop it.
        let mut entries = self.entries.write();
        if entries.get(&key).is_some_and(|e| e.is_expired(self.ttl)) {
            entries.remove(&key);
        }
        None
    }

    /// Stores (or overwrites) the snapshot for the address set.
    pub fn insert(&self, addresses: &AddressSet, chain_id: ChainId, snapshot: Snapshot) {
        let mut entries = self.entries.write();
        entries.insert(
            (addresses.canonical_key(), chain_id),
            CacheEntry {
                snapshot,
                addresses: addresses.clone(),
                cached_at: Instant::now(),
            },
        );
    }

    /// Removes every entry whose address set intersects `addresses`.
    ///
    /// Called after any action known to change on-chain state (a purchase,
    /// a renewal), so the next read re-resolves instead of serving the
    /// pre-purchase snapshot for up to a TTL.
    pub fn invalidate(&self, addresses: &AddressSet, chain_id: ChainId) {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(_, entry_chain), entry| {
            *entry_chain != chain_id || !entry.addresses.intersects(addresses)
        });
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "invalidated membership snapshots");
        }
    }

    /// Drops all expired entries.
    pub fn purge_expired(&self) {
        let mut entries = self.entries.write();
        entries.retain(|_, entry| !entry.is_expired(self.ttl));
    }

    /// Returns cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        let expired = entries.values().filter(|e| e.is_expired(self.ttl)).count();
        CacheStats { len: entries.len(), expired }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn addresses(input: &[&str]) -> AddressSet {
        AddressSet::parse(input.iter().copied()).unwrap()
    }

    fn snapshot() -> Snapshot {
        Snapshot {
            chain_id: ChainId::new(1),
            tiers: Vec::new(),
            resolved_at_ms: 0,
            tiers_fingerprint: "fp".to_string(),
        }
    }

    const A: &str = "0xaaaa000000000000000000000000000000000001";
    const B: &str = "0xbbbb000000000000000000000000000000000002";

    #[test]
    fn hit_within_ttl() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let set = addresses(&[A]);
        cache.insert(&set, ChainId::new(1), snapshot());
        assert!(cache.get(&set, ChainId::new(1)).is_some());
    }

    #[test]
    fn miss_on_other_chain() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let set = addresses(&[A]);
        cache.insert(&set, ChainId::new(1), snapshot());
        assert!(cache.get(&set, ChainId::new(2)).is_none());
    }

    #[test]
    fn expired_entry_is_dropped_on_access() {
        let cache = SnapshotCache::new(Duration::from_millis(0));
        let set = addresses(&[A]);
        cache.insert(&set, ChainId::new(1), snapshot());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&set, ChainId::new(1)).is_none());
        assert_eq!(cache.stats().len, 0);
    }

    #[test]
    fn invalidate_removes_intersecting_sets() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let both = addresses(&[A, B]);
        let only_b = addresses(&[B]);
        cache.insert(&both, ChainId::new(1), snapshot());
        cache.insert(&only_b, ChainId::new(1), snapshot());

        cache.invalidate(&addresses(&[A]), ChainId::new(1));

        // The {A, B} entry intersects and is gone; {B} survives.
        assert!(cache.get(&both, ChainId::new(1)).is_none());
        assert!(cache.get(&only_b, ChainId::new(1)).is_some());
    }

    #[test]
    fn invalidate_is_chain_scoped() {
        let cache = SnapshotCache::new(Duration::from_secs(60));
        let set = addresses(&[A]);
        cache.insert(&set, ChainId::new(1), snapshot());
        cache.invalidate(&set, ChainId::new(2));
        assert!(cache.get(&set, ChainId::new(1)).is_some());
    }

    #[test]
    fn purge_drops_only_expired() {
        let cache = SnapshotCache::new(Duration::from_millis(20));
        cache.insert(&addresses(&[A]), ChainId::new(1), snapshot());
        std::thread::sleep(Duration::from_millis(40));
        cache.insert(&addresses(&[B]), ChainId::new(1), snapshot());

        cache.purge_expired();
        let stats = cache.stats();
        assert_eq!(stats.len, 1);
        assert_eq!(stats.expired, 0);
    }
}
