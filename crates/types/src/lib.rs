//! Core types and configuration for the Keygate membership core.
//!
//! This crate provides the foundational types used throughout the workspace:
//! - Identifier newtypes (`ChainId`, `TokenId`) and checksummed-insensitive
//!   wallet [`Address`] handling
//! - Tier configuration and the [`tiers_fingerprint`] cache-validity key
//! - Membership snapshot types and the pure status-derivation kernel
//! - Configuration sections with validation, loaded from TOML files and
//!   environment variables

pub mod config;
pub mod membership;
pub mod tier;
pub mod types;

// Re-export commonly used types at crate root
pub use config::{ConfigError, CoreConfig};
pub use membership::{KeyStatus, Snapshot, TierState};
pub use tier::{TierConfig, tiers_fingerprint};
pub use types::{Address, AddressError, AddressSet, ChainId, TokenId, epoch_ms_now};
