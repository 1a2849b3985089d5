//! The admin roster cache.
//!
//! The roster — one row per registered portal user with live membership
//! status — is expensive to compute: a full fan-out over every user through
//! the membership service, against rate-limited upstreams. This crate keeps
//! it acceptably fresh at acceptable cost:
//!
//! - roster pages and a metadata commit record live in the shared key-value
//!   store; the metadata write is the atomic commit point, so readers never
//!   observe a torn page set as valid
//! - reads classify the cache as fresh, stale-but-usable, or miss; the
//!   configured mode decides whether a stale read blocks
//!   ([`CacheMode::ReadThrough`]) or serves immediately while a background
//!   rebuild runs ([`CacheMode::StaleWhileRevalidate`])
//! - rebuilds coordinate through an expiring lock lease; losing the race
//!   degrades to computing in-process without persisting, so every caller
//!   still gets a correct answer
//!
//! [`CacheMode::ReadThrough`]: keygate_types::config::CacheMode::ReadThrough
//! [`CacheMode::StaleWhileRevalidate`]: keygate_types::config::CacheMode::StaleWhileRevalidate

mod error;
mod manager;
mod member;
mod pages;
mod status;

pub use error::{Result, RosterError};
pub use manager::{GetOptions, RebuildOutcome, Roster, RosterManager};
pub use member::{PortalUser, RosterMember, RosterSummary, UserDirectory, summarize};
pub use status::{MissReason, RosterStatus, Staleness, classify};
