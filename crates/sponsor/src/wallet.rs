//! Sponsor balance advisory.

use keygate_client::ChainReader;
use keygate_types::Address;

use crate::error::{Result, SponsorError};

/// Whether the sponsor wallet holds at least `min_balance_wei`.
///
/// Advisory only: a `false` answer means sponsoring should be reported
/// unavailable, not that an in-flight transaction must be aborted. A `None`
/// threshold disables the check and always answers `true`.
///
/// # Errors
///
/// Propagates chain read failures as [`SponsorError::ChainRead`]; callers
/// decide whether an unknown balance blocks sponsoring.
pub async fn sponsor_has_balance(
    chain: &dyn ChainReader,
    sponsor: &Address,
    min_balance_wei: Option<u128>,
) -> Result<bool> {
    let Some(min) = min_balance_wei else {
        return Ok(true);
    };

    let balance = chain
        .balance_wei(sponsor)
        .await
        .map_err(|e| SponsorError::ChainRead { message: e.to_string() })?;

    if balance < min {
        tracing::warn!(
            sponsor = sponsor.as_str(),
            balance,
            min,
            "sponsor balance below configured minimum"
        );
    }
    Ok(balance >= min)
}
