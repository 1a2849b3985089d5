//! Membership snapshot types and the pure status-derivation kernel.
//!
//! The I/O pipeline that resolves these values (subgraph, chain fallback,
//! retries) lives in `keygate-membership`; everything here is deterministic
//! and directly unit-testable.

use serde::{Deserialize, Serialize};

use crate::{
    tier::TierConfig,
    types::{Address, ChainId, TokenId},
};

/// Resolved membership status for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    /// A valid, unexpired key is held.
    Active,
    /// A key was held but its expiry has passed.
    Expired,
    /// No key resolvable for this tier.
    None,
}

impl KeyStatus {
    /// Rank for best-tier selection: higher is better.
    const fn rank(self) -> u8 {
        match self {
            Self::Active => 2,
            Self::Expired => 1,
            Self::None => 0,
        }
    }

    /// Static label for logs and summaries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::None => "none",
        }
    }
}

/// Derives a [`KeyStatus`] from a resolved expiry and validity flag.
///
/// - `expiry > now` → active
/// - `0 < expiry <= now` → expired
/// - no resolvable expiry but the contract reports the key valid → active
/// - otherwise → none
#[must_use]
pub fn derive_status(expiry_epoch_s: Option<u64>, has_valid_key: bool, now_epoch_s: u64) -> KeyStatus {
    match expiry_epoch_s {
        Some(expiry) if expiry > now_epoch_s => KeyStatus::Active,
        Some(expiry) if expiry > 0 => KeyStatus::Expired,
        _ if has_valid_key => KeyStatus::Active,
        _ => KeyStatus::None,
    }
}

/// Resolved membership state for one (address set, tier) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierState {
    /// Tier this state was resolved for.
    pub tier_id: String,
    /// Derived status.
    pub status: KeyStatus,
    /// Key expiry in epoch seconds, when one was resolvable.
    pub expiry_epoch_s: Option<u64>,
    /// Token ids found for the address set in this tier.
    pub token_ids: Vec<TokenId>,
    /// Addresses that actually own the found tokens.
    pub owner_addresses: Vec<Address>,
}

impl TierState {
    /// A `none` state for a tier nothing could be resolved for.
    #[must_use]
    pub fn none(tier_id: impl Into<String>) -> Self {
        Self {
            tier_id: tier_id.into(),
            status: KeyStatus::None,
            expiry_epoch_s: None,
            token_ids: Vec::new(),
            owner_addresses: Vec::new(),
        }
    }
}

/// The resolved membership status for an address set across all tiers at a
/// point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Chain the snapshot was resolved against.
    pub chain_id: ChainId,
    /// Per-tier states, one entry per configured tier.
    pub tiers: Vec<TierState>,
    /// Resolution wall-clock time, epoch milliseconds.
    pub resolved_at_ms: i64,
    /// Fingerprint of the tier configuration this was computed under.
    pub tiers_fingerprint: String,
}

impl Snapshot {
    /// Returns the state for a specific tier, if configured.
    #[must_use]
    pub fn tier(&self, tier_id: &str) -> Option<&TierState> {
        self.tiers.iter().find(|t| t.tier_id == tier_id)
    }

    /// True if any tier is active.
    #[must_use]
    pub fn is_member(&self) -> bool {
        self.tiers.iter().any(|t| t.status == KeyStatus::Active)
    }

    /// Selects the best tier state for display purposes.
    ///
    /// Preference: status (active > expired > none), then configured tier
    /// order (lower order ranks higher), then latest expiry.
    #[must_use]
    pub fn best_tier<'a>(&'a self, tiers: &[TierConfig]) -> Option<&'a TierState> {
        let order_of = |tier_id: &str| {
            tiers
                .iter()
                .find(|t| t.id == tier_id)
                .map_or(u32::MAX, |t| t.order)
        };
        self.tiers.iter().max_by(|a, b| {
            a.status
                .rank()
                .cmp(&b.status.rank())
                // Lower configured order ranks higher, so compare reversed.
                .then_with(|| order_of(&b.tier_id).cmp(&order_of(&a.tier_id)))
                .then_with(|| a.expiry_epoch_s.cmp(&b.expiry_epoch_s))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::Address;

    const NOW: u64 = 1_700_000_000;

    #[test]
    fn status_active_when_expiry_in_future() {
        assert_eq!(derive_status(Some(NOW + 100), false, NOW), KeyStatus::Active);
    }

    #[test]
    fn status_expired_when_expiry_passed() {
        assert_eq!(derive_status(Some(NOW - 100), false, NOW), KeyStatus::Expired);
        assert_eq!(derive_status(Some(NOW), false, NOW), KeyStatus::Expired);
    }

    #[test]
    fn status_active_on_validity_flag_without_expiry() {
        assert_eq!(derive_status(None, true, NOW), KeyStatus::Active);
        assert_eq!(derive_status(Some(0), true, NOW), KeyStatus::Active);
    }

    #[test]
    fn status_none_without_anything() {
        assert_eq!(derive_status(None, false, NOW), KeyStatus::None);
        assert_eq!(derive_status(Some(0), false, NOW), KeyStatus::None);
    }

    fn tier_cfg(id: &str, order: u32) -> TierConfig {
        TierConfig {
            id: id.to_string(),
            contract_address: Address::parse("0xaaaa000000000000000000000000000000000001")
                .unwrap(),
            order,
            renewable: false,
            never_expires: false,
        }
    }

    fn state(tier_id: &str, status: KeyStatus, expiry: Option<u64>) -> TierState {
        TierState {
            tier_id: tier_id.to_string(),
            status,
            expiry_epoch_s: expiry,
            token_ids: Vec::new(),
            owner_addresses: Vec::new(),
        }
    }

    fn snapshot(tiers: Vec<TierState>) -> Snapshot {
        Snapshot {
            chain_id: ChainId::new(1),
            tiers,
            resolved_at_ms: 0,
            tiers_fingerprint: String::new(),
        }
    }

    #[test]
    fn best_tier_prefers_active_over_expired() {
        let configs = vec![tier_cfg("low", 2), tier_cfg("high", 1)];
        let snap = snapshot(vec![
            state("high", KeyStatus::Expired, Some(NOW - 10)),
            state("low", KeyStatus::Active, Some(NOW + 10)),
        ]);
        assert_eq!(snap.best_tier(&configs).unwrap().tier_id, "low");
    }

    #[test]
    fn best_tier_breaks_active_tie_by_order() {
        let configs = vec![tier_cfg("low", 2), tier_cfg("high", 1)];
        let snap = snapshot(vec![
            state("low", KeyStatus::Active, Some(NOW + 10)),
            state("high", KeyStatus::Active, Some(NOW + 10)),
        ]);
        assert_eq!(snap.best_tier(&configs).unwrap().tier_id, "high");
    }

    #[test]
    fn best_tier_breaks_order_tie_by_latest_expiry() {
        let configs = vec![tier_cfg("a", 1), tier_cfg("b", 1)];
        let snap = snapshot(vec![
            state("a", KeyStatus::Active, Some(NOW + 10)),
            state("b", KeyStatus::Active, Some(NOW + 500)),
        ]);
        assert_eq!(snap.best_tier(&configs).unwrap().tier_id, "b");
    }

    #[test]
    fn is_member_requires_an_active_tier() {
        let snap = snapshot(vec![state("a", KeyStatus::Expired, Some(NOW - 10))]);
        assert!(!snap.is_member());
        let snap = snapshot(vec![state("a", KeyStatus::Active, Some(NOW + 10))]);
        assert!(snap.is_member());
    }
}
