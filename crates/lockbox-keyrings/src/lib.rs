//! # lockbox-keyrings: reference keyring implementations.
//!
//! Every keyring implements [`lockbox_core::traits::Keyring`]. Secret-bearing
//! keyrings derive Ed25519 keys and use BLAKE3 for address hashing and child
//! key derivation.
//!
//! # Modules
//!
//! - [`keys`]: KeyPair, address derivation, signing payloads
//! - [`mnemonic`]: BIP-39 generation and validation
//! - [`simple`]: raw private key keyring
//! - [`hd`]: mnemonic keyring with indexed child accounts
//! - [`watch`]: watch-only address keyring
//! - [`hardware`]: hardware device reference keyrings
//! - [`gnosis`]: multisig reference keyring
//! - [`registry`]: type name to constructor mapping

pub mod gnosis;
pub mod hardware;
pub mod hd;
pub mod keys;
pub mod mnemonic;
pub mod registry;
pub mod simple;
pub mod watch;

// Re-exports for convenient access
pub use gnosis::GnosisKeyring;
pub use hardware::{DeviceSigner, HardwareKeyring};
pub use hd::HdKeyring;
pub use keys::KeyPair;
pub use registry::KeyringRegistry;
pub use simple::SimpleKeyring;
pub use watch::WatchKeyring;
