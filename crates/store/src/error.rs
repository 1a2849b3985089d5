//! Store error types.

use snafu::{Location, Snafu};

use crate::kv::Key;

/// Result type alias for store operations.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors surfaced by [`crate::KeyValueStore`] implementations.
///
/// [`StoreError::ConditionFailed`] is load-bearing: it is the one signal the
/// coordination layers (leases, daily counters) build their semantics on, and
/// callers match on it explicitly. Everything else is transport/backend
/// trouble.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// A conditional operation's condition did not hold.
    #[snafu(display("condition failed for {key}"))]
    ConditionFailed {
        /// Key the conditional operation targeted.
        key: Key,
    },

    /// A batch write exceeded the per-call request limit.
    #[snafu(display("batch of {count} exceeds the {limit}-item write limit"))]
    BatchTooLarge {
        /// Requests in the rejected batch.
        count: usize,
        /// The enforced limit.
        limit: usize,
    },

    /// The backend failed (network, throttling, internal).
    #[snafu(display("store backend error at {location}: {message}"))]
    Backend {
        /// Backend-specific description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// A stored attribute could not be decoded into the expected shape.
    #[snafu(display("malformed record at {key}: {message}"))]
    Malformed {
        /// Key of the malformed record.
        key: Key,
        /// What failed to decode.
        message: String,
    },
}

impl StoreError {
    /// True for [`StoreError::ConditionFailed`].
    ///
    /// Lets callers distinguish "lost the race" (expected, handled) from
    /// backend trouble (propagated) without matching every variant.
    #[must_use]
    pub fn is_condition_failure(&self) -> bool {
        matches!(self, Self::ConditionFailed { .. })
    }
}
