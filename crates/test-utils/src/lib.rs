//! Shared test utilities for Keygate crates.
//!
//! This crate provides common test helpers to reduce boilerplate across test
//! modules:
//!
//! - [`assert_eventually`] - Poll a condition until it's true or timeout
//! - [`ScriptedChain`] / [`ScriptedSubgraph`] - Programmable fakes for the
//!   upstream client traits, with failure injection and call counting
//! - [`fixtures`] - Canned tiers, addresses, and short-TTL configs

#![deny(unsafe_code)]
// Test utilities are allowed to use unwrap for simplicity
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod assertions;
pub mod fixtures;
mod scripted;

pub use assertions::{assert_eventually, init_tracing};
pub use scripted::{ScriptedChain, ScriptedSubgraph};
