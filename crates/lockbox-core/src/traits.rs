//! Trait interfaces for the Lockbox vault.
//!
//! These traits define the contracts between crates:
//! - [`Keyring`]: one key source (lockbox-keyrings implements)
//! - [`Encryptor`]: password-keyed symmetric encryption (lockbox-service implements)
//! - [`KeyringStore`]: persistence of [`KeyringState`] (lockbox-service implements)

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{EncryptorError, KeyringError, StoreError};
use crate::types::{BrandedAccount, Eip7702Authorization, KeyringState};

/// Optional keyring capabilities, detected at runtime.
///
/// The required surface (accounts, serialization, the four signing methods)
/// is always present on [`Keyring`]. Everything listed here may be missing,
/// and callers must check [`Keyring::supports`] before relying on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `remove_account` is implemented.
    RemoveAccount,
    /// `sign_eip7702_authorization` is implemented.
    SignEip7702Authorization,
    /// `get_accounts_with_brand` reports real per-account brands.
    AccountsWithBrand,
    /// `forget_device` releases a paired hardware device.
    ForgetDevice,
    /// `export_account` can reveal the private key.
    ExportAccount,
}

/// A single key source: mnemonic, raw private keys, hardware device,
/// watch-only address list, or multisig reference.
///
/// Implementations own their secret material. The service only ever sees
/// addresses, signatures, and the opaque `serialize` payload.
#[async_trait]
pub trait Keyring: Send + Sync {
    /// Stable type name, e.g. `"HD Key Tree"`.
    fn keyring_type(&self) -> &str;

    /// Optional capabilities this keyring implements.
    fn capabilities(&self) -> &'static [Capability] {
        &[]
    }

    /// Whether an optional capability is implemented.
    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Serialize to the opaque vault payload.
    fn serialize(&self) -> Result<Value, KeyringError>;

    /// Restore from a payload produced by [`serialize`](Self::serialize)
    /// (or from constructor options of the same shape).
    fn deserialize(&mut self, data: Value) -> Result<(), KeyringError>;

    /// Addresses managed by this keyring, in derivation/import order.
    fn get_accounts(&self) -> Vec<String>;

    /// Derive or create `n` more accounts, returning the new addresses.
    async fn add_accounts(&mut self, n: usize) -> Result<Vec<String>, KeyringError>;

    /// Sign a transaction object, returning the hex signature.
    async fn sign_transaction(
        &self,
        address: &str,
        tx: &Value,
        opts: &Value,
    ) -> Result<String, KeyringError>;

    /// Sign raw message data (`0x` hex or UTF-8 text).
    async fn sign_message(
        &self,
        address: &str,
        data: &str,
        opts: &Value,
    ) -> Result<String, KeyringError>;

    /// Sign a message with the personal-message prefix applied.
    async fn sign_personal_message(
        &self,
        address: &str,
        data: &str,
        opts: &Value,
    ) -> Result<String, KeyringError>;

    /// Sign structured typed data.
    async fn sign_typed_data(
        &self,
        address: &str,
        data: &Value,
        opts: &Value,
    ) -> Result<String, KeyringError>;

    /// Remove one account. Optional: see [`Capability::RemoveAccount`].
    fn remove_account(&mut self, _address: &str, _brand: Option<&str>) -> Result<(), KeyringError> {
        Err(KeyringError::unsupported(
            self.keyring_type(),
            "account removal operations",
        ))
    }

    /// Sign an EIP-7702 authorization. Optional.
    async fn sign_eip7702_authorization(
        &self,
        _address: &str,
        _authorization: &Eip7702Authorization,
        _opts: &Value,
    ) -> Result<String, KeyringError> {
        Err(KeyringError::unsupported(
            self.keyring_type(),
            "signEip7702Authorization operation",
        ))
    }

    /// Accounts with brand labels. Keyrings without per-account branding
    /// report their type as the brand.
    fn get_accounts_with_brand(&self) -> Vec<BrandedAccount> {
        self.get_accounts()
            .into_iter()
            .map(|address| BrandedAccount {
                address,
                brand_name: self.keyring_type().to_string(),
                real_brand_name: None,
            })
            .collect()
    }

    /// Release a paired hardware device. No-op unless supported.
    async fn forget_device(&mut self) -> Result<(), KeyringError> {
        Ok(())
    }

    /// Reveal the private key of one account. Optional.
    async fn export_account(&self, _address: &str) -> Result<String, KeyringError> {
        Err(KeyringError::unsupported(
            self.keyring_type(),
            "exportAccount operation",
        ))
    }

    /// Public identifier of the keyring, if it has one (HD keyrings).
    fn public_key(&self) -> Option<String> {
        None
    }

    /// Whether the secret was imported rather than generated in-app.
    fn by_import(&self) -> Option<bool> {
        None
    }

    /// Ordinal among HD keyrings, used for default naming.
    fn hd_index(&self) -> Option<u32> {
        None
    }

    /// Assign the ordinal among HD keyrings.
    fn set_hd_index(&mut self, _index: u32) {}
}

/// Password-keyed symmetric encryption of JSON values.
///
/// `decrypt` must report a wrong password as
/// [`EncryptorError::InvalidPassword`] and any malformed payload as
/// [`EncryptorError::CorruptedPayload`].
pub trait Encryptor: Send + Sync {
    /// Encrypt a value into an opaque string.
    fn encrypt(&self, password: &str, value: &Value) -> Result<String, EncryptorError>;

    /// Decrypt a string produced by [`encrypt`](Self::encrypt).
    fn decrypt(&self, password: &str, payload: &str) -> Result<Value, EncryptorError>;
}

/// Persistence of the keyring state object.
pub trait KeyringStore: Send + Sync {
    /// Load the stored state. `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<KeyringState>, StoreError>;

    /// Replace the stored state atomically.
    fn save(&self, state: &KeyringState) -> Result<(), StoreError>;
}
