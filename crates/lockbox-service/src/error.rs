//! Service-level error type.
use lockbox_core::error::{EncryptorError, KeyringError, StoreError};
use lockbox_core::types::KeyringId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)] Keyring(#[from] KeyringError),
    #[error(transparent)] Encryptor(#[from] EncryptorError),
    #[error(transparent)] Store(#[from] StoreError),
    #[error("Cannot unlock without a previous vault")] NoVault,
    #[error("Cannot persist vault without password and encryption key")] PasswordNotSet,
    #[error("The account you're are trying to import is a duplicate: {0}")] DuplicateAccount(String),
    #[error("No keyring found for the requested account.")] NoKeyringForAccount,
    #[error("You're trying to overwrite password on existing keyrings.")] AccountsExist,
    #[error("unknown keyring type: {0}")] UnknownKeyringType(String),
    #[error("invalid mnemonic")] InvalidMnemonic,
    #[error("no keyring with handle {0}")] UnknownKeyring(KeyringId),
}

impl ServiceError {
    /// Whether this error is a rejected password.
    pub fn is_invalid_password(&self) -> bool {
        matches!(self, Self::Encryptor(EncryptorError::InvalidPassword))
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
