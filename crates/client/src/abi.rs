//! Minimal call-data codec for fixed-shape membership contract reads.
//!
//! The core only ever calls a handful of view functions taking `address` or
//! `uint256` arguments and returning a single word, so a full ABI library is
//! unnecessary. Selectors are derived at runtime from the canonical signature
//! strings — the expiry-getter list is deployment configuration, not code.

use keygate_types::{Address, TokenId};
use sha3::{Digest, Keccak256};

use crate::error::{ClientError, Result};

/// A single 32-byte ABI word.
const WORD: usize = 32;

/// An encodable call argument.
#[derive(Debug, Clone, Copy)]
pub enum Arg<'a> {
    /// An `address` argument.
    Address(&'a Address),
    /// A `uint256` argument (the core never needs more than 128 bits).
    Uint(u128),
}

/// Computes the 4-byte function selector for a canonical signature such as
/// `"balanceOf(address)"`.
#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Encodes a call to `signature` with the given arguments as `0x`-prefixed
/// call data.
#[must_use]
pub fn encode_call(signature: &str, args: &[Arg<'_>]) -> String {
    let mut data = Vec::with_capacity(4 + args.len() * WORD);
    data.extend_from_slice(&selector(signature));
    for arg in args {
        let mut word = [0u8; WORD];
        match arg {
            Arg::Address(address) => word[12..].copy_from_slice(&address.to_bytes()),
            Arg::Uint(value) => word[16..].copy_from_slice(&value.to_be_bytes()),
        }
        data.extend_from_slice(&word);
    }
    format!("0x{}", hex::encode(data))
}

/// Decodes a `0x`-prefixed hex response into raw bytes.
fn decode_hex(response: &str) -> Result<Vec<u8>> {
    let stripped = response.strip_prefix("0x").unwrap_or(response);
    hex::decode(stripped).map_err(|e| ClientError::Decode {
        what: "call response".to_string(),
        message: e.to_string(),
    })
}

/// Decodes a single-word response as an unsigned integer.
///
/// Values exceeding 128 bits saturate to `u128::MAX`; membership contracts
/// use the all-ones word to mean "never expires", and saturation preserves
/// that meaning without a big-integer dependency.
pub fn decode_uint(response: &str) -> Result<u128> {
    let bytes = decode_hex(response)?;
    if bytes.len() < WORD {
        return Err(ClientError::Decode {
            what: "uint word".to_string(),
            message: format!("response is {} bytes, expected {WORD}", bytes.len()),
        });
    }
    let (high, low) = bytes[..WORD].split_at(WORD - 16);
    if high.iter().any(|&b| b != 0) {
        return Ok(u128::MAX);
    }
    let mut word = [0u8; 16];
    word.copy_from_slice(low);
    Ok(u128::from_be_bytes(word))
}

/// Decodes a single-word response as a boolean.
pub fn decode_bool(response: &str) -> Result<bool> {
    Ok(decode_uint(response)? != 0)
}

/// Decodes a single-word response as a token id.
///
/// # Errors
///
/// Returns [`ClientError::Decode`] for values beyond `u64` — no membership
/// contract mints ids in that range, so such a response is corrupt.
pub fn decode_token_id(response: &str) -> Result<TokenId> {
    let value = decode_uint(response)?;
    u64::try_from(value).map(TokenId::new).map_err(|_| ClientError::Decode {
        what: "token id".to_string(),
        message: format!("value {value} exceeds u64"),
    })
}

/// The argument kind a probe signature expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeArg {
    /// Probe takes the owner address.
    Address,
    /// Probe takes a token id.
    TokenId,
}

/// Classifies an expiry-probe signature by its argument list.
///
/// # Errors
///
/// Returns [`ClientError::Decode`] for signatures the codec cannot encode;
/// misconfigured probes fail loudly rather than being silently skipped.
pub fn classify_probe(signature: &str) -> Result<ProbeArg> {
    if signature.ends_with("(address)") {
        Ok(ProbeArg::Address)
    } else if signature.ends_with("(uint256)") {
        Ok(ProbeArg::TokenId)
    } else {
        Err(ClientError::Decode {
            what: "expiry probe signature".to_string(),
            message: format!("unsupported argument list in {signature}"),
        })
    }
}
