//! Paginated cache persistence.
//!
//! Layout in the shared store, all under one partition:
//!
//! ```text
//! roster#cache / meta          the commit record
//! roster#cache / page#000001   ordered member fragments, 1-based
//! roster#cache / page#000002
//! ...
//! ```
//!
//! Pages are written first, metadata last. The metadata write is the commit
//! point: a crash mid-write leaves the previous metadata pointing at the
//! previous (still complete) page set, so readers never see a torn new
//! entry as valid. The reverse failure — metadata claiming more pages than
//! exist — is detected on read and classified a miss.

use std::{sync::Arc, time::Duration};

use keygate_store::{Key, KeyValueStore, Record, WriteRequest};

use crate::{
    error::{Result, RosterError},
    member::{RosterMember, RosterSummary, summarize},
    status::{MissReason, Staleness, classify},
};

/// Bumped when the stored shape changes incompatibly; entries from other
/// versions are treated as absent.
const CACHE_FORMAT_VERSION: i64 = 1;

const PARTITION: &str = "roster#cache";
const META_SORT: &str = "meta";
const PAGE_PREFIX: &str = "page#";

const VERSION_ATTR: &str = "format_version";
const COMPUTED_AT_ATTR: &str = "computed_at_ms";
const EXPIRES_AT_ATTR: &str = "expires_at_ms";
const PAGE_COUNT_ATTR: &str = "page_count";
const PAGE_SIZE_ATTR: &str = "page_size";
const TOTAL_ATTR: &str = "total_members";
const FINGERPRINT_ATTR: &str = "tiers_fingerprint";
const SUMMARY_ATTR: &str = "summary";

const PAGE_INDEX_ATTR: &str = "page_index";
const MEMBERS_ATTR: &str = "members";

fn page_key(index: u32) -> Key {
    Key::new(PARTITION, format!("{PAGE_PREFIX}{index:06}"))
}

fn meta_key() -> Key {
    Key::new(PARTITION, META_SORT)
}

/// A fully loaded, structurally valid cache entry.
#[derive(Debug, Clone)]
pub(crate) struct CachedRoster {
    pub members: Vec<RosterMember>,
    pub summary: RosterSummary,
    pub computed_at_ms: i64,
    pub expires_at_ms: i64,
    pub page_count: u32,
    pub staleness: Staleness,
}

/// Outcome of a cache read.
#[derive(Debug, Clone)]
pub(crate) enum CacheReadOutcome {
    /// A valid entry within the hard staleness bound.
    Usable(Box<CachedRoster>),
    /// No servable entry; the reason feeds diagnostics and trace events.
    Miss(MissReason),
}

/// Metadata fields surfaced even when the entry is not servable.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MetaPeek {
    pub computed_at_ms: i64,
    pub expires_at_ms: i64,
    pub page_count: u32,
    pub total_members: u32,
}

/// Reads and writes the paginated cache entry.
pub(crate) struct CacheRepo {
    store: Arc<dyn KeyValueStore>,
    page_size: u32,
    ttl: Duration,
    max_stale: Duration,
    fingerprint: String,
}

impl CacheRepo {
    pub(crate) fn new(
        store: Arc<dyn KeyValueStore>,
        page_size: u32,
        ttl: Duration,
        max_stale: Duration,
        fingerprint: String,
    ) -> Self {
        Self { store, page_size, ttl, max_stale, fingerprint }
    }

    /// Loads the cache entry and classifies it.
    ///
    /// Integrity findings come back as [`CacheReadOutcome::Miss`]; only
    /// store transport failures are errors.
    pub(crate) async fn load(&self, now_ms: i64) -> Result<CacheReadOutcome> {
        let Some(meta) = self.get(&meta_key()).await? else {
            return Ok(CacheReadOutcome::Miss(MissReason::NoMetadata));
        };

        if meta.get_i64(VERSION_ATTR) != Some(CACHE_FORMAT_VERSION) {
            return Ok(CacheReadOutcome::Miss(MissReason::VersionMismatch));
        }
        if meta.get_str(FINGERPRINT_ATTR) != Some(self.fingerprint.as_str()) {
            return Ok(CacheReadOutcome::Miss(MissReason::FingerprintMismatch));
        }

        let computed_at_ms = meta.get_i64(COMPUTED_AT_ATTR).unwrap_or(0);
        let expires_at_ms = meta.get_i64(EXPIRES_AT_ATTR).unwrap_or(0);
        let staleness = classify(computed_at_ms, expires_at_ms, now_ms, self.max_stale);
        if !staleness.within_max_stale {
            return Ok(CacheReadOutcome::Miss(MissReason::BeyondMaxStale));
        }

        let page_count =
            u32::try_from(meta.get_i64(PAGE_COUNT_ATTR).unwrap_or(0)).unwrap_or(0);
        if page_count == 0 {
            // A valid entry always has at least one (possibly empty) page.
            return Ok(CacheReadOutcome::Miss(MissReason::TornWrite {
                expected: 0,
                found: 0,
            }));
        }

        let pages = self
            .store
            .query_prefix(PARTITION, PAGE_PREFIX)
            .await
            .map_err(|source| RosterError::Store { source })?;

        // Reassemble in order; leftover pages beyond page_count (from a
        // shrink whose cleanup hasn't run) are ignored.
        let mut fragments: Vec<Option<Vec<RosterMember>>> = vec![None; page_count as usize];
        let mut found: u32 = 0;
        for (_, record) in pages {
            let Some(index) = record.get_u64(PAGE_INDEX_ATTR) else {
                continue;
            };
            let Ok(index) = u32::try_from(index) else {
                continue;
            };
            if index == 0 || index > page_count {
                continue;
            }
            let members: Vec<RosterMember> = match record.get_json(MEMBERS_ATTR) {
                Ok(Some(members)) => members,
                Ok(None) => {
                    return Ok(CacheReadOutcome::Miss(MissReason::Corrupt {
                        message: format!("page {index} has no members attribute"),
                    }));
                },
                Err(e) => {
                    return Ok(CacheReadOutcome::Miss(MissReason::Corrupt {
                        message: format!("page {index}: {e}"),
                    }));
                },
            };
            fragments[(index - 1) as usize] = Some(members);
            found += 1;
        }

        if fragments.iter().any(Option::is_none) {
            return Ok(CacheReadOutcome::Miss(MissReason::TornWrite {
                expected: page_count,
                found,
            }));
        }

        let members: Vec<RosterMember> = fragments.into_iter().flatten().flatten().collect();

        // Entries written before the summary existed are recomputed rather
        // than invalidated.
        let summary = match meta.get_json::<RosterSummary>(SUMMARY_ATTR) {
            Ok(Some(summary)) => summary,
            _ => summarize(&members, u64::try_from(now_ms / 1000).unwrap_or(0)),
        };

        Ok(CacheReadOutcome::Usable(Box::new(CachedRoster {
            members,
            summary,
            computed_at_ms,
            expires_at_ms,
            page_count,
            staleness,
        })))
    }

    /// Persists a freshly built roster.
    ///
    /// Pages first (in bounded batches), metadata last as the commit record,
    /// then best-effort deletion of leftover pages beyond the new count.
    pub(crate) async fn save(
        &self,
        members: &[RosterMember],
        summary: RosterSummary,
        computed_at_ms: i64,
    ) -> Result<()> {
        let chunks: Vec<&[RosterMember]> = if members.is_empty() {
            // An empty roster still produces one empty page, so page_count
            // is always >= 1 and readers can distinguish "empty" from
            // "torn".
            vec![&[]]
        } else {
            members.chunks(self.page_size as usize).collect()
        };
        let page_count = u32::try_from(chunks.len()).unwrap_or(u32::MAX);

        let mut writes = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let index = u32::try_from(i).unwrap_or(u32::MAX) + 1;
            let mut record = Record::new().with(PAGE_INDEX_ATTR, index);
            record
                .set_json(MEMBERS_ATTR, chunk)
                .map_err(|e| RosterError::Encode { message: e.to_string() })?;
            writes.push(WriteRequest::Put { key: page_key(index), record });
        }

        self.store
            .batch_write_chunked(writes)
            .await
            .map_err(|source| RosterError::Store { source })?;

        let expires_at_ms =
            computed_at_ms + i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let mut meta = Record::new()
            .with(VERSION_ATTR, CACHE_FORMAT_VERSION)
            .with(COMPUTED_AT_ATTR, computed_at_ms)
            .with(EXPIRES_AT_ATTR, expires_at_ms)
            .with(PAGE_COUNT_ATTR, page_count)
            .with(PAGE_SIZE_ATTR, self.page_size)
            .with(TOTAL_ATTR, u32::try_from(members.len()).unwrap_or(u32::MAX))
            .with(FINGERPRINT_ATTR, self.fingerprint.clone());
        meta.set_json(SUMMARY_ATTR, &summary)
            .map_err(|e| RosterError::Encode { message: e.to_string() })?;

        self.store
            .put(&meta_key(), meta)
            .await
            .map_err(|source| RosterError::Store { source })?;

        self.cleanup_orphan_pages(page_count).await;
        Ok(())
    }

    /// Deletes pages beyond `page_count` left over from a shrinking roster.
    ///
    /// Best-effort: readers ignore orphans, so failures only cost storage.
    async fn cleanup_orphan_pages(&self, page_count: u32) {
        let pages = match self.store.query_prefix(PARTITION, PAGE_PREFIX).await {
            Ok(pages) => pages,
            Err(e) => {
                tracing::warn!(error = %e, "orphan page listing failed");
                return;
            },
        };

        for (key, record) in pages {
            let beyond = record
                .get_u64(PAGE_INDEX_ATTR)
                .and_then(|i| u32::try_from(i).ok())
                .is_none_or(|i| i > page_count);
            if beyond {
                if let Err(e) = self.store.delete(&key, None).await {
                    tracing::warn!(key = %key, error = %e, "orphan page deletion failed");
                }
            }
        }
    }

    /// Raw metadata fields, even for entries that would classify as a miss.
    pub(crate) async fn peek_meta(&self) -> Result<Option<MetaPeek>> {
        let Some(meta) = self.get(&meta_key()).await? else {
            return Ok(None);
        };
        Ok(Some(MetaPeek {
            computed_at_ms: meta.get_i64(COMPUTED_AT_ATTR).unwrap_or(0),
            expires_at_ms: meta.get_i64(EXPIRES_AT_ATTR).unwrap_or(0),
            page_count: u32::try_from(meta.get_i64(PAGE_COUNT_ATTR).unwrap_or(0)).unwrap_or(0),
            total_members: u32::try_from(meta.get_i64(TOTAL_ATTR).unwrap_or(0)).unwrap_or(0),
        }))
    }

    async fn get(&self, key: &Key) -> Result<Option<Record>, RosterError> {
        self.store.get(key).await.map_err(|source| RosterError::Store { source })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use keygate_store::MemoryStore;
    use keygate_types::KeyStatus;

    use super::*;

    const TTL: Duration = Duration::from_secs(600);
    const MAX_STALE: Duration = Duration::from_secs(3600);

    fn member(n: usize) -> RosterMember {
        RosterMember {
            user_id: format!("user-{n:03}"),
            display_name: None,
            email: None,
            addresses: Vec::new(),
            status: KeyStatus::Active,
            tier_id: Some("patron".to_string()),
            expiry_epoch_s: Some(2_000_000_000),
            auto_renew: Some(true),
            token_ids: Vec::new(),
        }
    }

    fn members(n: usize) -> Vec<RosterMember> {
        (0..n).map(member).collect()
    }

    fn repo(store: &Arc<MemoryStore>, page_size: u32) -> CacheRepo {
        CacheRepo::new(
            Arc::clone(store) as Arc<dyn KeyValueStore>,
            page_size,
            TTL,
            MAX_STALE,
            "fp-current".to_string(),
        )
    }

    async fn load_usable(repo: &CacheRepo, now_ms: i64) -> CachedRoster {
        match repo.load(now_ms).await.unwrap() {
            CacheReadOutcome::Usable(cached) => *cached,
            CacheReadOutcome::Miss(reason) => panic!("expected usable cache, got {reason:?}"),
        }
    }

    #[tokio::test]
    async fn save_load_round_trip_preserves_order() {
        let store = Arc::new(MemoryStore::new());
        let repo = repo(&store, 3);
        let original = members(8);
        let summary = summarize(&original, 0);

        repo.save(&original, summary, 1_000).await.unwrap();
        let cached = load_usable(&repo, 1_500).await;

        assert_eq!(cached.members, original);
        assert_eq!(cached.page_count, 3);
        assert_eq!(cached.computed_at_ms, 1_000);
        assert!(cached.staleness.is_fresh);
    }

    #[tokio::test]
    async fn empty_roster_still_writes_one_page() {
        let store = Arc::new(MemoryStore::new());
        let repo = repo(&store, 3);
        repo.save(&[], RosterSummary::default(), 1_000).await.unwrap();

        let cached = load_usable(&repo, 1_500).await;
        assert!(cached.members.is_empty());
        assert_eq!(cached.page_count, 1);
    }

    #[tokio::test]
    async fn missing_metadata_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        let repo = repo(&store, 3);
        match repo.load(0).await.unwrap() {
            CacheReadOutcome::Miss(MissReason::NoMetadata) => {},
            other => panic!("expected NoMetadata, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_page_is_a_torn_write() {
        let store = Arc::new(MemoryStore::new());
        let repo = repo(&store, 3);
        repo.save(&members(8), RosterSummary::default(), 1_000).await.unwrap();

        store.delete(&page_key(2), None).await.unwrap();

        match repo.load(1_500).await.unwrap() {
            CacheReadOutcome::Miss(MissReason::TornWrite { expected: 3, found: 2 }) => {},
            other => panic!("expected TornWrite, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fingerprint_mismatch_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        repo(&store, 3).save(&members(2), RosterSummary::default(), 1_000).await.unwrap();

        let other = CacheRepo::new(
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
            3,
            TTL,
            MAX_STALE,
            "fp-other".to_string(),
        );
        match other.load(1_500).await.unwrap() {
            CacheReadOutcome::Miss(MissReason::FingerprintMismatch) => {},
            other => panic!("expected FingerprintMismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn entry_beyond_max_stale_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        let repo = repo(&store, 3);
        repo.save(&members(1), RosterSummary::default(), 0).await.unwrap();

        let beyond = i64::try_from(MAX_STALE.as_millis()).unwrap() + 1;
        match repo.load(beyond).await.unwrap() {
            CacheReadOutcome::Miss(MissReason::BeyondMaxStale) => {},
            other => panic!("expected BeyondMaxStale, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stale_entry_within_bound_is_usable() {
        let store = Arc::new(MemoryStore::new());
        let repo = repo(&store, 3);
        repo.save(&members(1), RosterSummary::default(), 0).await.unwrap();

        // Past the ttl, inside max_stale.
        let now = i64::try_from(TTL.as_millis()).unwrap() + 100_000;
        let cached = load_usable(&repo, now).await;
        assert!(!cached.staleness.is_fresh);
        assert!(cached.staleness.within_max_stale);
    }

    #[tokio::test]
    async fn shrinking_roster_cleans_up_orphan_pages() {
        let store = Arc::new(MemoryStore::new());
        let repo = repo(&store, 3);

        repo.save(&members(8), RosterSummary::default(), 1_000).await.unwrap();
        let pages = store.query_prefix(PARTITION, PAGE_PREFIX).await.unwrap();
        assert_eq!(pages.len(), 3);

        repo.save(&members(2), RosterSummary::default(), 2_000).await.unwrap();
        let pages = store.query_prefix(PARTITION, PAGE_PREFIX).await.unwrap();
        assert_eq!(pages.len(), 1);

        // And the surviving entry reads back clean.
        let cached = load_usable(&repo, 2_500).await;
        assert_eq!(cached.members.len(), 2);
    }

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            /// Any member list survives a save/load round trip at any page
            /// size, in order, with page_count >= 1.
            #[test]
            fn prop_page_round_trip(count in 0usize..40, page_size in 1u32..10) {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .unwrap();

                runtime.block_on(async {
                    let store = Arc::new(MemoryStore::new());
                    let repo = CacheRepo::new(
                        Arc::clone(&store) as Arc<dyn KeyValueStore>,
                        page_size,
                        TTL,
                        MAX_STALE,
                        "fp-current".to_string(),
                    );
                    let original = members(count);
                    repo.save(&original, RosterSummary::default(), 1_000).await.unwrap();

                    let cached = load_usable(&repo, 1_500).await;
                    assert_eq!(cached.members, original);
                    assert!(cached.page_count >= 1);
                    let expected_pages =
                        (count as u32).div_ceil(page_size).max(1);
                    assert_eq!(cached.page_count, expected_pages);
                });
            }
        }
    }

    #[tokio::test]
    async fn legacy_entry_without_summary_recomputes_it() {
        let store = Arc::new(MemoryStore::new());
        let repo = repo(&store, 10);
        let rows = members(4);
        repo.save(&rows, summarize(&rows, 0), 1_000).await.unwrap();

        // Strip the summary attribute, simulating an entry written before
        // the summary shape existed.
        let mut meta = store.get(&meta_key()).await.unwrap().unwrap();
        meta.remove(SUMMARY_ATTR);
        store.put(&meta_key(), meta).await.unwrap();

        let cached = load_usable(&repo, 1_500).await;
        assert_eq!(cached.summary.total, 4);
        assert_eq!(cached.summary.active, 4);
    }
}
