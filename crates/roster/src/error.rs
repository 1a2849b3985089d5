//! Roster errors.
//!
//! Cache integrity findings (missing pages, fingerprint mismatches) are
//! deliberately NOT here: they are a [`crate::MissReason`] on the read path
//! and trigger a rebuild, never a failure.

use keygate_store::StoreError;
use snafu::Snafu;

/// Result type alias for roster operations.
pub type Result<T, E = RosterError> = std::result::Result<T, E>;

/// Errors from roster builds and cache persistence.
#[derive(Debug, Snafu)]
pub enum RosterError {
    /// The user directory could not be listed.
    #[snafu(display("user directory listing failed: {message}"))]
    Directory {
        /// Directory failure description.
        message: String,
    },

    /// The shared store failed.
    #[snafu(display("roster store operation failed: {source}"))]
    Store {
        /// Underlying store error.
        source: StoreError,
    },

    /// A roster payload could not be serialized for storage.
    #[snafu(display("failed to encode roster page: {message}"))]
    Encode {
        /// Serialization failure description.
        message: String,
    },
}
