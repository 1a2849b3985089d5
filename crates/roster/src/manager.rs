//! The roster cache manager.

use std::{sync::Arc, time::Duration};

use keygate_membership::MembershipService;
use keygate_store::{Key, KeyValueStore, LeaseError, LeaseKeeper};
use keygate_types::{
    AddressSet, KeyStatus,
    config::{CacheMode, RosterCacheConfig},
    epoch_ms_now,
};
use tokio::sync::Semaphore;

use crate::{
    error::{Result, RosterError},
    member::{PortalUser, RosterMember, RosterSummary, UserDirectory, summarize},
    pages::{CacheReadOutcome, CacheRepo, CachedRoster},
    status::RosterStatus,
};

/// Rebuild lock lease: long enough for a full fan-out over every user,
/// short enough that a crashed builder doesn't wedge rebuilds for long.
const REBUILD_LOCK_TTL: Duration = Duration::from_secs(300);

fn lock_key() -> Key {
    Key::new("roster#lock", "rebuild")
}

/// Read options for [`RosterManager::get`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Admin-requested refresh: bypass the cache and recompute now.
    pub force_refresh: bool,
    /// Scheduled-job rebuild: same behavior, kept distinct for call-site
    /// clarity and logging.
    pub force_rebuild: bool,
}

impl GetOptions {
    fn forced(self) -> bool {
        self.force_refresh || self.force_rebuild
    }
}

/// A roster as returned to callers.
#[derive(Debug, Clone)]
pub struct Roster {
    /// One row per registered user, ordered by user id.
    pub members: Vec<RosterMember>,
    /// Build-time aggregate counts.
    pub summary: RosterSummary,
    /// When this roster was computed, epoch milliseconds.
    pub computed_at_ms: i64,
    /// Whether this data came from the shared cache (possibly stale) rather
    /// than a fan-out in this request.
    pub from_cache: bool,
}

/// Outcome of an explicit rebuild.
#[derive(Debug, Clone)]
pub struct RebuildOutcome {
    /// The freshly computed roster.
    pub roster: Roster,
    /// Whether the result was persisted to the shared cache. Only the
    /// rebuild-lock holder persists; losers compute in-process and discard.
    pub persisted: bool,
}

/// Builds, stores, and serves the admin roster.
///
/// Cheap to clone; clones share the same store handles, so background
/// rebuilds run against the same cache as the request that spawned them.
#[derive(Clone)]
pub struct RosterManager {
    repo: Arc<CacheRepo>,
    keeper: LeaseKeeper,
    directory: Arc<dyn UserDirectory>,
    membership: Arc<MembershipService>,
    config: RosterCacheConfig,
}

impl RosterManager {
    /// Creates a manager over the shared store.
    ///
    /// Cache entries are fingerprinted with the membership service's tier
    /// configuration, so entries computed under a different configuration
    /// are never served.
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        directory: Arc<dyn UserDirectory>,
        membership: Arc<MembershipService>,
        config: RosterCacheConfig,
    ) -> Self {
        let repo = CacheRepo::new(
            Arc::clone(&store),
            config.page_size,
            config.ttl,
            config.max_stale,
            membership.fingerprint().to_string(),
        );
        Self {
            repo: Arc::new(repo),
            keeper: LeaseKeeper::new(store),
            directory,
            membership,
            config,
        }
    }

    /// The primary read path.
    ///
    /// - caching off: always compute fresh, no store interaction
    /// - fresh hit: serve cached
    /// - stale within `max_stale`: serve cached and schedule a background
    ///   rebuild (stale-while-revalidate), or rebuild synchronously
    ///   (read-through)
    /// - miss or beyond `max_stale`: rebuild synchronously regardless of
    ///   mode — unbounded-age data is never served
    ///
    /// # Errors
    ///
    /// Propagates directory and store failures; membership resolution
    /// failures degrade per row instead of failing the read.
    pub async fn get(&self, options: GetOptions) -> Result<Roster> {
        if !self.config.is_enabled() {
            let (members, summary, computed_at_ms) = self.build().await?;
            return Ok(Roster { members, summary, computed_at_ms, from_cache: false });
        }

        if options.forced() {
            tracing::info!(
                force_refresh = options.force_refresh,
                force_rebuild = options.force_rebuild,
                "forced roster rebuild"
            );
            return Ok(self.rebuild().await?.roster);
        }

        match self.repo.load(epoch_ms_now()).await? {
            CacheReadOutcome::Usable(cached) if cached.staleness.is_fresh => {
                Ok(Self::from_cached(*cached))
            },
            CacheReadOutcome::Usable(cached) => {
                if self.config.mode == CacheMode::StaleWhileRevalidate {
                    self.spawn_background_rebuild().await;
                    Ok(Self::from_cached(*cached))
                } else {
                    // Read-through: the reader pays for freshness.
                    Ok(self.rebuild().await?.roster)
                }
            },
            CacheReadOutcome::Miss(reason) => {
                tracing::debug!(?reason, "roster cache miss");
                Ok(self.rebuild().await?.roster)
            },
        }
    }

    /// Rebuilds the roster now, coordinating through the rebuild lock.
    ///
    /// The lock holder persists its result; a caller that loses the lock
    /// race still computes in-process and returns a correct roster, it just
    /// doesn't write it back — correctness over cache pollution.
    ///
    /// # Errors
    ///
    /// Propagates directory and store failures.
    pub async fn rebuild(&self) -> Result<RebuildOutcome> {
        match self.keeper.try_acquire(&lock_key(), REBUILD_LOCK_TTL).await {
            Ok((guard, _)) => {
                let result = self.build_and_persist().await;
                // Guaranteed cleanup on success and failure alike; an
                // unreleased lock only delays the next rebuild by the ttl.
                self.keeper.release_quiet(&guard).await;
                result.map(|roster| RebuildOutcome { roster, persisted: true })
            },
            Err(LeaseError::Busy { .. }) => {
                tracing::info!("rebuild lock busy, computing in-process without persisting");
                let (members, summary, computed_at_ms) = self.build().await?;
                Ok(RebuildOutcome {
                    roster: Roster { members, summary, computed_at_ms, from_cache: false },
                    persisted: false,
                })
            },
            Err(LeaseError::Lost { key }) => Err(RosterError::Store {
                source: keygate_store::StoreError::ConditionFailed { key },
            }),
            Err(LeaseError::Store { source }) => Err(RosterError::Store { source }),
        }
    }

    /// Reports cache and lock state for monitoring surfaces.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn load_status(&self) -> Result<RosterStatus> {
        let now_ms = epoch_ms_now();
        let outcome = self.repo.load(now_ms).await?;
        let peek = self.repo.peek_meta().await?;
        let lock = match self.keeper.view(&lock_key()).await {
            Ok(view) => view,
            Err(LeaseError::Store { source }) => return Err(RosterError::Store { source }),
            Err(_) => None,
        };

        let status = match outcome {
            CacheReadOutcome::Usable(cached) => RosterStatus {
                exists: true,
                miss_reason: None,
                is_fresh: cached.staleness.is_fresh,
                is_stale_usable: cached.staleness.is_stale && cached.staleness.within_max_stale,
                computed_at_ms: Some(cached.computed_at_ms),
                expires_at_ms: Some(cached.expires_at_ms),
                page_count: Some(cached.page_count),
                total_members: Some(u32::try_from(cached.members.len()).unwrap_or(u32::MAX)),
                lock_held: lock.is_some_and(|l| l.held),
                lock_expires_at_ms: lock.map(|l| l.expires_at_ms),
            },
            CacheReadOutcome::Miss(reason) => RosterStatus {
                exists: false,
                miss_reason: Some(reason),
                is_fresh: false,
                is_stale_usable: false,
                computed_at_ms: peek.map(|m| m.computed_at_ms),
                expires_at_ms: peek.map(|m| m.expires_at_ms),
                page_count: peek.map(|m| m.page_count),
                total_members: peek.map(|m| m.total_members),
                lock_held: lock.is_some_and(|l| l.held),
                lock_expires_at_ms: lock.map(|l| l.expires_at_ms),
            },
        };
        Ok(status)
    }

    fn from_cached(cached: CachedRoster) -> Roster {
        Roster {
            members: cached.members,
            summary: cached.summary,
            computed_at_ms: cached.computed_at_ms,
            from_cache: true,
        }
    }

    /// Fire-and-forget rebuild for the stale-while-revalidate path.
    ///
    /// Skips spawning when the lock is already held so a burst of stale
    /// reads schedules one builder, not one per reader. The lock check here
    /// is advisory; the spawned rebuild still goes through `try_acquire`.
    async fn spawn_background_rebuild(&self) {
        match self.keeper.view(&lock_key()).await {
            Ok(Some(view)) if view.held => {
                tracing::debug!("background rebuild already in flight");
                return;
            },
            Ok(_) => {},
            Err(e) => {
                tracing::warn!(error = %e, "rebuild lock probe failed, skipping background rebuild");
                return;
            },
        }

        let manager = self.clone();
        tokio::spawn(async move {
            match manager.rebuild().await {
                Ok(outcome) if outcome.persisted => {
                    tracing::info!(
                        members = outcome.roster.members.len(),
                        "background roster rebuild persisted"
                    );
                },
                Ok(_) => {
                    tracing::debug!("background rebuild lost the lock race, discarded");
                },
                Err(e) => {
                    tracing::warn!(error = %e, "background roster rebuild failed");
                },
            }
        });
    }

    /// Builds, persists, and returns a fresh roster. Caller holds the lock.
    async fn build_and_persist(&self) -> Result<Roster> {
        let started = std::time::Instant::now();
        let (members, summary, computed_at_ms) = self.build().await?;
        self.repo.save(&members, summary, computed_at_ms).await?;
        tracing::info!(
            members = members.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "roster rebuilt and persisted"
        );
        Ok(Roster { members, summary, computed_at_ms, from_cache: false })
    }

    /// The full fan-out: one membership resolution per registered user,
    /// bounded by the membership service's concurrency cap, with per-user
    /// isolation — one failing user yields an unresolved row, never a failed
    /// build.
    async fn build(&self) -> Result<(Vec<RosterMember>, RosterSummary, i64)> {
        let users = self
            .directory
            .list_users()
            .await
            .map_err(|message| RosterError::Directory { message })?;

        let semaphore = Arc::new(Semaphore::new(self.membership.max_concurrency() as usize));
        let mut handles = Vec::with_capacity(users.len());
        for user in users {
            let semaphore = Arc::clone(&semaphore);
            let membership = Arc::clone(&self.membership);
            let fallback = RosterMember::unresolved(&user);
            handles.push((
                fallback,
                tokio::spawn(async move {
                    // Closed-semaphore is unreachable (we never close it);
                    // treat it like any other per-user failure.
                    let _permit = semaphore.acquire_owned().await;
                    resolve_member(&membership, &user).await
                }),
            ));
        }

        let mut members = Vec::with_capacity(handles.len());
        for (fallback, handle) in handles {
            match handle.await {
                Ok(member) => members.push(member),
                Err(e) => {
                    tracing::warn!(
                        user_id = fallback.user_id.as_str(),
                        error = %e,
                        "member resolution task failed, recording unresolved row"
                    );
                    members.push(fallback);
                },
            }
        }

        members.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        let computed_at_ms = epoch_ms_now();
        let summary = summarize(&members, u64::try_from(computed_at_ms / 1000).unwrap_or(0));
        Ok((members, summary, computed_at_ms))
    }
}

/// Resolves one user's roster row through the membership service.
async fn resolve_member(membership: &MembershipService, user: &PortalUser) -> RosterMember {
    if user.addresses.is_empty() {
        return RosterMember::unresolved(user);
    }

    let addresses = AddressSet::from_addresses(user.addresses.clone());
    // Force-refresh: a rebuild exists to observe current chain state, not
    // to replay the request-path snapshot cache.
    let snapshot = membership.get_state(&addresses, true).await;

    let best = snapshot.best_tier(membership.tiers());
    let mut row = RosterMember::unresolved(user);
    if let Some(best) = best {
        row.status = best.status;
        row.expiry_epoch_s = best.expiry_epoch_s;
        row.token_ids = best.token_ids.clone();
        if best.status != KeyStatus::None {
            row.tier_id = Some(best.tier_id.clone());
        }
    }
    row
}
