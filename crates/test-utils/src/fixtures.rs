//! Canned configuration and identity fixtures.

use std::time::Duration;

use keygate_types::{
    Address, AddressSet, ChainId,
    config::{CacheMode, MembershipConfig, RetryPolicy, RosterCacheConfig},
    tier::TierConfig,
};

/// The chain id used throughout the test suites.
pub const CHAIN: ChainId = ChainId::new(31_337);

/// A deterministic test wallet address: `0x{n:040x}`.
pub fn wallet(n: u64) -> Address {
    Address::parse(&format!("0x{n:040x}")).unwrap()
}

/// A deterministic tier contract address, distinct from [`wallet`] values.
pub fn contract(n: u64) -> Address {
    Address::parse(&format!("0x{:040x}", 0xC0_0000_0000u64 + n)).unwrap()
}

/// An address set over the given wallet numbers.
pub fn wallets(ns: &[u64]) -> AddressSet {
    AddressSet::from_addresses(ns.iter().map(|&n| wallet(n)).collect())
}

/// A tier with the given id and order, on [`contract`]`(order)`.
pub fn tier(id: &str, order: u32) -> TierConfig {
    TierConfig {
        id: id.to_string(),
        contract_address: contract(u64::from(order)),
        order,
        renewable: true,
        never_expires: false,
    }
}

/// The standard two-tier configuration used by the suites.
pub fn two_tiers() -> Vec<TierConfig> {
    vec![tier("patron", 1), tier("supporter", 2)]
}

/// A membership config with a short snapshot TTL.
pub fn membership_config() -> MembershipConfig {
    MembershipConfig::builder()
        .snapshot_ttl(Duration::from_millis(100))
        .max_concurrency(4)
        .build()
        .unwrap()
}

/// A roster cache config with tight, test-sized windows.
pub fn roster_config(mode: CacheMode) -> RosterCacheConfig {
    RosterCacheConfig::builder()
        .mode(mode)
        .ttl(Duration::from_millis(200))
        .max_stale(Duration::from_secs(2))
        .page_size(3)
        .build()
        .unwrap()
}

/// A single-attempt retry policy for tests that count upstream calls.
pub fn no_retries() -> RetryPolicy {
    RetryPolicy::no_retries()
}

/// A fast retry policy for tests that exercise the backoff path.
pub fn fast_retries(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .initial_backoff(Duration::from_millis(5))
        .max_backoff(Duration::from_millis(20))
        .multiplier(2.0)
        .jitter(0.0)
        .build()
        .unwrap()
}
