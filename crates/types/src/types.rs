//! Core type definitions for Keygate.
//!
//! Identifier newtypes follow the same pattern everywhere: transparent serde,
//! `new()`/`value()`, and a prefixed `Display` so log lines stay greppable.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

// ============================================================================
// Identifier Types
// ============================================================================

/// Generates a newtype wrapper around a numeric type for type-safe identifiers.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident, $inner:ty, $prefix:expr
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name($inner);

        impl $name {
            /// Creates a new identifier from a raw value.
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Returns the raw numeric value.
            #[inline]
            pub const fn value(self) -> $inner {
                self.0
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}:{}", $prefix, self.0)
            }
        }
    };
}

define_id!(
    /// EVM network identifier (e.g. `1` for mainnet, `8453` for Base).
    ///
    /// # Display
    ///
    /// Formats with `chain:` prefix: `chain:8453`.
    ChainId, u64, "chain"
);

define_id!(
    /// On-chain membership key (NFT) identifier.
    ///
    /// The wire type is `uint256`, but membership contracts mint sequential
    /// token ids; values beyond `u64` are rejected at the decode boundary.
    TokenId, u64, "key"
);

// ============================================================================
// Wallet Addresses
// ============================================================================

/// Error returned when parsing a wallet address.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum AddressError {
    /// The address is not `0x` followed by 40 hex characters.
    #[snafu(display("malformed address: {input}"))]
    Malformed {
        /// The rejected input.
        input: String,
    },
}

/// A normalized (lowercase) EVM wallet address.
///
/// All address comparisons in the workspace go through this type, so mixed
/// checksum casings from user input, the subgraph, and chain responses can
/// never cause spurious mismatches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parses and normalizes an address.
    ///
    /// Accepts any checksum casing; stores lowercase.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::Malformed`] unless the input is `0x` followed
    /// by exactly 40 hex characters.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"));
        match hex_part {
            Some(h) if h.len() == 40 && h.bytes().all(|b| b.is_ascii_hexdigit()) => {
                Ok(Self(format!("0x{}", h.to_ascii_lowercase())))
            },
            _ => MalformedSnafu { input: trimmed.to_string() }.fail(),
        }
    }

    /// Returns the normalized `0x`-prefixed lowercase form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the 20 raw address bytes.
    ///
    /// Infallible for any constructed `Address`: `parse` guarantees 40 hex
    /// characters.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        // Skip "0x"; each byte is two validated hex chars.
        for (i, chunk) in self.0.as_bytes()[2..].chunks_exact(2).enumerate() {
            let hi = hex_nibble(chunk[0]);
            let lo = hex_nibble(chunk[1]);
            out[i] = (hi << 4) | lo;
        }
        out
    }
}

fn hex_nibble(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A deduplicated, sorted set of normalized addresses.
///
/// This is the cache-key unit for membership snapshots: two requests for the
/// same wallets in different order or casing must hit the same cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressSet(Vec<Address>);

impl AddressSet {
    /// Builds a set from arbitrary address inputs: normalizes, dedups, sorts.
    ///
    /// # Errors
    ///
    /// Returns the first [`AddressError`] encountered.
    pub fn parse<I, S>(inputs: I) -> Result<Self, AddressError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut addrs: Vec<Address> = inputs
            .into_iter()
            .map(|s| Address::parse(s.as_ref()))
            .collect::<Result<_, _>>()?;
        addrs.sort();
        addrs.dedup();
        Ok(Self(addrs))
    }

    /// Builds a set from already-normalized addresses.
    #[must_use]
    pub fn from_addresses(mut addrs: Vec<Address>) -> Self {
        addrs.sort();
        addrs.dedup();
        Self(addrs)
    }

    /// The member addresses, sorted.
    #[must_use]
    pub fn addresses(&self) -> &[Address] {
        &self.0
    }

    /// True if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Canonical string form used for cache keys: addresses joined with `,`.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        self.0
            .iter()
            .map(Address::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// True if any address in `self` also appears in `other`.
    #[must_use]
    pub fn intersects(&self, other: &AddressSet) -> bool {
        // Sets are small (a user's linked wallets); linear scan is fine.
        self.0.iter().any(|a| other.0.binary_search(a).is_ok())
    }
}

// ============================================================================
// Time
// ============================================================================

/// Current wall-clock time as milliseconds since the Unix epoch.
///
/// Coordination records store timestamps as integer milliseconds so the
/// store's numeric conditions (`lease_until < now`) work directly.
#[must_use]
pub fn epoch_ms_now() -> i64 {
    Utc::now().timestamp_millis()
}
