//! Roster rows, the user directory seam, and the build-time summary.

use async_trait::async_trait;
use keygate_types::{Address, KeyStatus, TokenId};
use serde::{Deserialize, Serialize};

/// A registered portal user, as reported by the user directory.
///
/// The directory itself (the portal's user registry) is outside this crate;
/// roster builds only need the identity fields and linked wallets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalUser {
    /// Stable user identifier.
    pub user_id: String,
    /// Display name, when the profile has one.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Contact email, when known.
    #[serde(default)]
    pub email: Option<String>,
    /// Wallet addresses linked to the account.
    #[serde(default)]
    pub addresses: Vec<Address>,
    /// The user's auto-renew preference, when recorded.
    #[serde(default)]
    pub auto_renew: Option<bool>,
}

/// Lists registered users for roster builds.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Every registered user, in any order.
    async fn list_users(&self) -> Result<Vec<PortalUser>, String>;
}

/// One roster row: a user plus their resolved membership state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterMember {
    /// Stable user identifier.
    pub user_id: String,
    /// Display name, when the profile has one.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Contact email, when known.
    #[serde(default)]
    pub email: Option<String>,
    /// Wallet addresses linked to the account.
    #[serde(default)]
    pub addresses: Vec<Address>,
    /// Best membership status across tiers.
    pub status: KeyStatus,
    /// The tier backing `status`, when any tier resolved.
    #[serde(default)]
    pub tier_id: Option<String>,
    /// Key expiry backing `status`, epoch seconds.
    #[serde(default)]
    pub expiry_epoch_s: Option<u64>,
    /// The user's auto-renew preference, when recorded.
    #[serde(default)]
    pub auto_renew: Option<bool>,
    /// Token ids held in the backing tier.
    #[serde(default)]
    pub token_ids: Vec<TokenId>,
}

impl RosterMember {
    /// A row for a user whose membership could not be resolved (no linked
    /// wallets, or every source failed).
    #[must_use]
    pub fn unresolved(user: &PortalUser) -> Self {
        Self {
            user_id: user.user_id.clone(),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            addresses: user.addresses.clone(),
            status: KeyStatus::None,
            tier_id: None,
            expiry_epoch_s: None,
            auto_renew: user.auto_renew,
            token_ids: Vec::new(),
        }
    }
}

/// Aggregate counts computed once at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RosterSummary {
    /// Total rows.
    pub total: u32,
    /// Rows with an active membership.
    pub active: u32,
    /// Rows with an expired membership.
    pub expired: u32,
    /// Rows with no resolvable membership.
    pub none: u32,
    /// Rows with auto-renew enabled.
    pub auto_renew_on: u32,
    /// Rows with auto-renew explicitly disabled.
    pub auto_renew_off: u32,
    /// Active rows whose key expires within the next 30 days.
    pub expiring_within_30d: u32,
}

/// Seconds in thirty days.
const THIRTY_DAYS_S: u64 = 30 * 24 * 60 * 60;

/// Computes the summary for a member list.
///
/// Also used to backfill the summary when serving a cache entry written
/// before the summary shape existed, so legacy entries stay servable.
#[must_use]
pub fn summarize(members: &[RosterMember], now_epoch_s: u64) -> RosterSummary {
    let mut summary = RosterSummary {
        total: u32::try_from(members.len()).unwrap_or(u32::MAX),
        ..RosterSummary::default()
    };

    for member in members {
        match member.status {
            KeyStatus::Active => summary.active += 1,
            KeyStatus::Expired => summary.expired += 1,
            KeyStatus::None => summary.none += 1,
        }
        match member.auto_renew {
            Some(true) => summary.auto_renew_on += 1,
            Some(false) => summary.auto_renew_off += 1,
            None => {},
        }
        if member.status == KeyStatus::Active {
            if let Some(expiry) = member.expiry_epoch_s {
                if expiry > now_epoch_s && expiry - now_epoch_s <= THIRTY_DAYS_S {
                    summary.expiring_within_30d += 1;
                }
            }
        }
    }
    summary
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn member(status: KeyStatus, expiry: Option<u64>, auto_renew: Option<bool>) -> RosterMember {
        RosterMember {
            user_id: "u".to_string(),
            display_name: None,
            email: None,
            addresses: Vec::new(),
            status,
            tier_id: None,
            expiry_epoch_s: expiry,
            auto_renew,
            token_ids: Vec::new(),
        }
    }

    #[test]
    fn summary_counts_statuses() {
        let members = vec![
            member(KeyStatus::Active, Some(NOW + 100), Some(true)),
            member(KeyStatus::Active, Some(NOW + 100), None),
            member(KeyStatus::Expired, Some(NOW - 100), Some(false)),
            member(KeyStatus::None, None, None),
        ];
        let summary = summarize(&members, NOW);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.active, 2);
        assert_eq!(summary.expired, 1);
        assert_eq!(summary.none, 1);
        assert_eq!(summary.auto_renew_on, 1);
        assert_eq!(summary.auto_renew_off, 1);
    }

    #[test]
    fn expiring_window_is_thirty_days_of_active_rows() {
        let members = vec![
            // Inside the window.
            member(KeyStatus::Active, Some(NOW + THIRTY_DAYS_S - 1), None),
            // On the boundary: still inside.
            member(KeyStatus::Active, Some(NOW + THIRTY_DAYS_S), None),
            // Beyond the window.
            member(KeyStatus::Active, Some(NOW + THIRTY_DAYS_S + 1), None),
            // Expired rows never count, whatever their expiry.
            member(KeyStatus::Expired, Some(NOW - 1), None),
        ];
        let summary = summarize(&members, NOW);
        assert_eq!(summary.expiring_within_30d, 2);
    }

    #[test]
    fn empty_roster_summarizes_to_zeroes() {
        let summary = summarize(&[], NOW);
        assert_eq!(summary, RosterSummary::default());
    }
}
