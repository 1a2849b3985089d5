//! Upstream clients for the Keygate core.
//!
//! Two read-only upstreams feed membership resolution:
//!
//! - the chain itself, over JSON-RPC ([`RpcClient`]) — authoritative, slow,
//!   rate limited
//! - a subgraph indexer ([`SubgraphClient`]) — fast, best-effort, never
//!   authoritative alone
//!
//! Both are seamed behind traits ([`ChainReader`], [`KeyIndex`]) so tests
//! substitute scripted fakes, and both classify errors for the bounded
//! retry in [`retry::with_retry`]: rate-limit and service-unavailable
//! responses retry with exponential backoff and jitter, everything else
//! propagates immediately.

pub mod abi;
mod error;
pub mod retry;
mod rpc;
mod subgraph;

pub use error::{ClientError, Result};
pub use rpc::{ChainReader, RpcClient};
pub use subgraph::{IndexedKey, KeyIndex, SubgraphClient};
