//! Membership state resolution.
//!
//! Given a set of wallet addresses, [`MembershipService`] resolves per-tier
//! membership status by combining two sources:
//!
//! 1. the subgraph indexer — cheap and fast, consulted first
//! 2. direct contract reads over JSON-RPC — authoritative fallback
//!
//! Resolution degrades gracefully by design: a tier whose sources all fail
//! resolves to `none` rather than failing the whole request, because a
//! membership check that throws locks a paying member out of content they
//! own. Resolved snapshots are held in a short-TTL process-local cache with
//! explicit invalidation for flows that change on-chain state.

mod cache;
mod service;

pub use cache::{CacheStats, SnapshotCache};
pub use service::MembershipService;
