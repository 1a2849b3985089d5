//! Key-value store abstraction and coordination primitives for Keygate.
//!
//! Request handlers are stateless and share no process memory; the only
//! mutable shared resource is a durable key-value store with conditional
//! writes. This crate defines that store's interface, an in-memory backend,
//! and the one reusable mutual-exclusion primitive built on top of it:
//!
//! - [`KeyValueStore`] — get/put/conditional-update/delete/query-by-prefix/
//!   batch-write, with a small condition/update grammar evaluated atomically
//! - [`MemoryStore`] — in-process backend; the linearization point for every
//!   concurrency test in the workspace
//! - [`LeaseKeeper`] — try-acquire expiring token, confirm-with-token,
//!   release-with-token; reused by both the roster rebuild lock and the
//!   sponsor nonce lease
//!
//! There is no distributed lock manager anywhere in this system. Every
//! exclusive mutation is a single conditional update whose condition
//! references either an owning token or a freshness predicate.

mod error;
mod kv;
mod lease;
mod memory;
mod record;

pub use error::{Result, StoreError};
pub use kv::{BATCH_WRITE_LIMIT, Condition, Key, KeyValueStore, Update, UpdateAction, WriteRequest};
pub use lease::{LEASE_ID_ATTR, LEASE_UNTIL_ATTR, LeaseError, LeaseGuard, LeaseKeeper, LeaseView};
pub use memory::MemoryStore;
pub use record::Record;
