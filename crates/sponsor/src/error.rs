//! Sponsor coordination errors.

use keygate_store::StoreError;
use keygate_types::{Address, ChainId};
use snafu::Snafu;

/// Result type alias for sponsor operations.
pub type Result<T, E = SponsorError> = std::result::Result<T, E>;

/// Errors from nonce leasing and budget reservation.
///
/// None of these are retried internally. `LeaseBusy` is surfaced to the
/// caller as retry-later; `DailyLimitReached` is a hard stop for the current
/// UTC day; `LeaseLost` is a logic bug (work outliving its lease) and must
/// never be swallowed.
#[derive(Debug, Snafu)]
pub enum SponsorError {
    /// Another handler currently holds the nonce lease.
    #[snafu(display("nonce lease for {sponsor} on {chain_id} is busy"))]
    LeaseBusy {
        /// Chain of the contested lease.
        chain_id: ChainId,
        /// Sponsor wallet of the contested lease.
        sponsor: Address,
    },

    /// The lease was taken over before this transition ran.
    #[snafu(display("nonce lease for {sponsor} on {chain_id} was lost"))]
    LeaseLost {
        /// Chain of the lost lease.
        chain_id: ChainId,
        /// Sponsor wallet of the lost lease.
        sponsor: Address,
    },

    /// The daily transaction budget is exhausted.
    #[snafu(display("daily sponsor budget reached ({max} tx) for {day}"))]
    DailyLimitReached {
        /// The UTC day whose budget is exhausted.
        day: String,
        /// The configured maximum.
        max: u32,
    },

    /// A broadcast would move the nonce backwards.
    #[snafu(display("nonce regression: next {next} does not advance past used {used}"))]
    NonceRegression {
        /// The nonce just broadcast.
        used: u64,
        /// The proposed next nonce.
        next: u64,
    },

    /// The shared store failed.
    #[snafu(display("sponsor store operation failed: {source}"))]
    Store {
        /// Underlying store error.
        source: StoreError,
    },

    /// A chain read needed by a sponsor guardrail failed.
    #[snafu(display("sponsor chain read failed: {message}"))]
    ChainRead {
        /// Underlying client error description.
        message: String,
    },
}
