//! Membership tier configuration and the cache-validity fingerprint.
//!
//! A tier is one on-chain membership contract. The set of configured tiers is
//! static for a deployment; anything cached that was computed under a
//! different tier set must never be served, so the whole set is reduced to a
//! single [`tiers_fingerprint`] string stored alongside cached artifacts.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::Address;

/// Static configuration for one membership tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct TierConfig {
    /// Stable tier identifier (e.g. `"supporter"`, `"patron"`).
    pub id: String,
    /// Membership contract address for this tier.
    #[schemars(with = "String")]
    pub contract_address: Address,
    /// Rank used to break ties when a wallet holds keys in several tiers.
    /// Lower is higher-ranked.
    pub order: u32,
    /// Whether keys in this tier can be renewed after expiry.
    #[serde(default)]
    pub renewable: bool,
    /// Whether keys in this tier never expire (expiry getters are skipped).
    #[serde(default)]
    pub never_expires: bool,
}

/// Computes the fingerprint of a tier configuration set.
///
/// The fingerprint is order-insensitive (tiers are sorted by id before
/// hashing) and covers every field that affects membership resolution, so
/// any configuration change invalidates caches computed under the old set.
///
/// Returns the first 16 bytes of a SHA-256 digest, hex encoded.
#[must_use]
pub fn tiers_fingerprint(tiers: &[TierConfig]) -> String {
    let mut sorted: Vec<&TierConfig> = tiers.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut hasher = Sha256::new();
    for tier in sorted {
        hasher.update(tier.id.as_bytes());
        hasher.update(b"|");
        hasher.update(tier.contract_address.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(tier.order.to_be_bytes());
        hasher.update([u8::from(tier.renewable), u8::from(tier.never_expires)]);
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn tier(id: &str, addr: &str, order: u32) -> TierConfig {
        TierConfig {
            id: id.to_string(),
            contract_address: Address::parse(addr).unwrap(),
            order,
            renewable: false,
            never_expires: false,
        }
    }

    const ADDR_A: &str = "0xaaaa000000000000000000000000000000000001";
    const ADDR_B: &str = "0xbbbb000000000000000000000000000000000002";

    #[test]
    fn fingerprint_is_order_insensitive() {
        let forward = vec![tier("a", ADDR_A, 1), tier("b", ADDR_B, 2)];
        let reversed = vec![tier("b", ADDR_B, 2), tier("a", ADDR_A, 1)];
        assert_eq!(tiers_fingerprint(&forward), tiers_fingerprint(&reversed));
    }

    #[test]
    fn fingerprint_changes_with_contract_address() {
        let one = vec![tier("a", ADDR_A, 1)];
        let other = vec![tier("a", ADDR_B, 1)];
        assert_ne!(tiers_fingerprint(&one), tiers_fingerprint(&other));
    }

    #[test]
    fn fingerprint_changes_with_order() {
        let one = vec![tier("a", ADDR_A, 1)];
        let other = vec![tier("a", ADDR_A, 2)];
        assert_ne!(tiers_fingerprint(&one), tiers_fingerprint(&other));
    }

    #[test]
    fn fingerprint_changes_with_flags() {
        let mut base = tier("a", ADDR_A, 1);
        let plain = tiers_fingerprint(std::slice::from_ref(&base));
        base.never_expires = true;
        let flagged = tiers_fingerprint(std::slice::from_ref(&base));
        assert_ne!(plain, flagged);
    }

    #[test]
    fn fingerprint_is_stable_hex() {
        let fp = tiers_fingerprint(&[tier("a", ADDR_A, 1)]);
        assert_eq!(fp.len(), 32);
        assert!(fp.bytes().all(|b| b.is_ascii_hexdigit()));
        // Same input, same output
        assert_eq!(fp, tiers_fingerprint(&[tier("a", ADDR_A, 1)]));
    }

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        fn arbitrary_tier() -> impl Strategy<Value = TierConfig> {
            (
                "[a-z]{1,8}",
                0u64..=u64::MAX,
                any::<u32>(),
                any::<bool>(),
                any::<bool>(),
            )
                .prop_map(|(id, addr, order, renewable, never_expires)| TierConfig {
                    id,
                    contract_address: Address::parse(&format!("0x{addr:040x}")).unwrap(),
                    order,
                    renewable,
                    never_expires,
                })
        }

        proptest! {
            /// Reordering a tier list never changes its fingerprint.
            #[test]
            fn prop_fingerprint_permutation_invariant(
                mut tiers in proptest::collection::vec(arbitrary_tier(), 0..6)
            ) {
                let forward = tiers_fingerprint(&tiers);
                tiers.reverse();
                prop_assert_eq!(forward, tiers_fingerprint(&tiers));
            }

            /// Changing any tier's order changes the fingerprint.
            #[test]
            fn prop_fingerprint_sees_order_changes(
                tier in arbitrary_tier(),
                bump in 1u32..1000
            ) {
                let original = tiers_fingerprint(std::slice::from_ref(&tier));
                let mut changed = tier;
                changed.order = changed.order.wrapping_add(bump);
                prop_assert_ne!(original, tiers_fingerprint(&[changed]));
            }
        }
    }
}
