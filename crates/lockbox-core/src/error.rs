//! Error types shared by keyrings, encryptors and state stores.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyringError {
    #[error("Keyring {keyring_type} doesn't support {operation}")] Unsupported { keyring_type: String, operation: String },
    #[error("invalid private key: {0}")] InvalidKey(String),
    #[error("invalid mnemonic: {0}")] InvalidMnemonic(String),
    #[error("invalid address: {0}")] InvalidAddress(String),
    #[error("address not found in keyring: {0}")] AddressNotFound(String),
    #[error("invalid keyring data: {0}")] InvalidData(String),
    #[error("device error: {0}")] Device(String),
    #[error("signing failed: {0}")] Signing(String),
}

impl KeyringError {
    /// Build the error returned when a keyring lacks an optional capability.
    pub fn unsupported(keyring_type: &str, operation: &str) -> Self {
        Self::Unsupported {
            keyring_type: keyring_type.to_string(),
            operation: operation.to_string(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncryptorError {
    #[error("invalid password")] InvalidPassword,
    #[error("corrupted payload: {0}")] CorruptedPayload(String),
    #[error("encryption: {0}")] Encryption(String),
    #[error("key derivation: {0}")] KeyDerivation(String),
    #[error("serialization: {0}")] Serialization(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("I/O error: {0}")] Io(String),
    #[error("corrupted state: {0}")] Corrupted(String),
    #[error("serialization: {0}")] Serialization(String),
}
