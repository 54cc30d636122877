//! Keyring service for the lockbox wallet.
//!
//! Holds the live keyrings, encrypts them into a password-protected vault
//! and drives the lock/unlock state machine. Also merges vaults exported
//! by the browser extension into the local one.

pub mod cipher;
pub mod config;
pub mod encryptor;
pub mod error;
pub mod events;
pub mod merge;
pub mod password;
pub mod service;
pub mod store;

pub use cipher::KdfParams;
pub use config::ServiceConfig;
pub use encryptor::PasswordEncryptor;
pub use error::ServiceError;
pub use events::KeyringEvent;
pub use merge::merge_vault;
pub use service::{AccountAliasHook, KeyringService};
pub use store::{JsonFileStore, MemoryStore};
