//! Integration test suite for Lockbox.
//!
//! Drives the keyring service through its public API against a real state
//! file and checks vault merging against recorded extension vaults.

pub mod helpers;
