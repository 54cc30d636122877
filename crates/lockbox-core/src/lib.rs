//! # lockbox-core
//! Foundation types and traits for the Lockbox keyring vault.

pub mod address;
pub mod constants;
pub mod error;
pub mod traits;
pub mod types;
