//! Sponsor wallet coordination.
//!
//! One sponsor wallet pays gas for many concurrent request handlers. Two
//! guardrails make that safe:
//!
//! - the **nonce lease** ([`NonceLeaseManager`]) serializes transaction
//!   submission per `(chain, sponsor)` so two handlers can never broadcast
//!   with the same nonce
//! - the **daily budget** ([`DailyBudget`]) caps transaction volume per UTC
//!   day with an atomic increment-with-upper-bound
//!
//! Per sponsored transaction attempt the lease walks a fixed lifecycle:
//!
//! ```text
//! UNRESERVED ──acquire──► LEASE_HELD ──record_broadcast──► BROADCAST_RECORDED
//!                             │                                   │
//!                             └──record_failure──► FAILURE_RECORDED
//!                                                         │
//!                         RELEASED ◄──────release─────────┘
//! ```
//!
//! Every transition after acquisition is conditioned on still holding the
//! same lease token; a transition attempted after losing the lease is
//! rejected, not retried — holding past the lease lifetime is a logic bug
//! that must surface.

mod budget;
mod error;
mod lease;
mod wallet;

pub use budget::{DailyBudget, SlotReservation, current_utc_day};
pub use error::{Result, SponsorError};
pub use lease::{NonceLease, NonceLeaseManager};
pub use wallet::sponsor_has_balance;
