//! Staleness classification and the diagnostics surface.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where a cache read landed on the freshness spectrum.
///
/// The three windows are disjoint and exhaustive for an existing entry:
/// fresh (`now < expires_at`), stale but within the hard bound, and beyond
/// the bound (never served).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Staleness {
    /// The entry is within its TTL.
    pub is_fresh: bool,
    /// The entry has outlived its TTL.
    pub is_stale: bool,
    /// The entry's age is still within the hard `max_stale` bound.
    pub within_max_stale: bool,
}

/// Classifies a cache entry's age.
#[must_use]
pub fn classify(
    computed_at_ms: i64,
    expires_at_ms: i64,
    now_ms: i64,
    max_stale: Duration,
) -> Staleness {
    let is_fresh = now_ms < expires_at_ms;
    let age_ms = now_ms.saturating_sub(computed_at_ms);
    let within_max_stale = age_ms <= i64::try_from(max_stale.as_millis()).unwrap_or(i64::MAX);
    Staleness { is_fresh, is_stale: !is_fresh, within_max_stale }
}

/// Why a cache read did not produce a servable roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    /// No metadata record exists.
    NoMetadata,
    /// The metadata was written by an incompatible cache format version.
    VersionMismatch,
    /// The metadata was computed under a different tier configuration.
    FingerprintMismatch,
    /// Fewer physical pages exist than the metadata claims — an incomplete
    /// write surfaced to a reader.
    TornWrite {
        /// Pages the metadata claims.
        expected: u32,
        /// Pages actually present.
        found: u32,
    },
    /// A page payload could not be decoded.
    Corrupt {
        /// Decode failure description.
        message: String,
    },
    /// The entry exists but is older than the hard staleness bound.
    BeyondMaxStale,
}

/// Cache state report for monitoring and diagnostic surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterStatus {
    /// Whether a structurally valid cache entry exists.
    pub exists: bool,
    /// Why the entry is unusable, when `exists` is false.
    pub miss_reason: Option<MissReason>,
    /// Whether the entry is within its TTL.
    pub is_fresh: bool,
    /// Whether the entry is past its TTL but within `max_stale`.
    pub is_stale_usable: bool,
    /// When the entry was computed, epoch milliseconds.
    pub computed_at_ms: Option<i64>,
    /// When the entry stops being fresh, epoch milliseconds.
    pub expires_at_ms: Option<i64>,
    /// Pages in the entry.
    pub page_count: Option<u32>,
    /// Member rows in the entry.
    pub total_members: Option<u32>,
    /// Whether the rebuild lock is currently held.
    pub lock_held: bool,
    /// When the rebuild lock self-expires, epoch milliseconds.
    pub lock_expires_at_ms: Option<i64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const MINUTE_MS: i64 = 60_000;

    #[test]
    fn fresh_entry() {
        // ttl 600s, age 100s
        let computed = 0;
        let expires = 600 * 1000;
        let now = 100 * 1000;
        let staleness = classify(computed, expires, now, Duration::from_secs(3600));
        assert!(staleness.is_fresh);
        assert!(!staleness.is_stale);
        assert!(staleness.within_max_stale);
    }

    #[test]
    fn stale_but_within_max_stale() {
        // ttl 600s, max_stale 3600s, age 700s
        let computed = 0;
        let expires = 600 * 1000;
        let now = 700 * 1000;
        let staleness = classify(computed, expires, now, Duration::from_secs(3600));
        assert!(!staleness.is_fresh);
        assert!(staleness.is_stale);
        assert!(staleness.within_max_stale);
    }

    #[test]
    fn beyond_max_stale() {
        // age 3700s
        let computed = 0;
        let expires = 600 * 1000;
        let now = 3700 * 1000;
        let staleness = classify(computed, expires, now, Duration::from_secs(3600));
        assert!(!staleness.is_fresh);
        assert!(staleness.is_stale);
        assert!(!staleness.within_max_stale);
    }

    #[test]
    fn exact_expiry_boundary_is_stale() {
        let staleness = classify(0, MINUTE_MS, MINUTE_MS, Duration::from_secs(3600));
        assert!(!staleness.is_fresh);
        assert!(staleness.is_stale);
    }

    #[test]
    fn exact_max_stale_boundary_is_within() {
        let staleness = classify(0, MINUTE_MS, 3600 * 1000, Duration::from_secs(3600));
        assert!(staleness.within_max_stale);
        let staleness = classify(0, MINUTE_MS, 3600 * 1000 + 1, Duration::from_secs(3600));
        assert!(!staleness.within_max_stale);
    }
}
