//! Core data types: accounts, serialized keyrings, persisted and in-memory
//! vault state.
//!
//! All persisted types serialize with camelCase field names so the state
//! file and the vault exchanged with the browser extension keep one shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::address::normalize_address;

/// An account as seen by the rest of the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Account address (`0x`-prefixed hex).
    pub address: String,
    /// Keyring type owning the account.
    #[serde(rename = "type")]
    pub keyring_type: String,
    /// Human-facing brand label (hardware vendor, etc.).
    pub brand_name: String,
}

impl Account {
    pub fn new(
        address: impl Into<String>,
        keyring_type: impl Into<String>,
        brand_name: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            keyring_type: keyring_type.into(),
            brand_name: brand_name.into(),
        }
    }

    /// Identity tuple: lowercased address, brand and type.
    pub fn identity(&self) -> (String, &str, &str) {
        (
            normalize_address(&self.address),
            self.brand_name.as_str(),
            self.keyring_type.as_str(),
        )
    }

    /// Whether both values refer to the same account.
    pub fn is_same(&self, other: &Account) -> bool {
        self.identity() == other.identity()
    }
}

/// An address paired with its brand, as reported by keyrings that expose
/// per-account branding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandedAccount {
    pub address: String,
    pub brand_name: String,
    /// Brand of the device that actually holds the key, when it differs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_brand_name: Option<String>,
}

/// Persistable representation of one keyring: `{ type, data }`.
///
/// `data` is opaque to the service; only the owning keyring type and the
/// vault merger interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedKeyring {
    #[serde(rename = "type")]
    pub keyring_type: String,
    pub data: Value,
}

impl SerializedKeyring {
    pub fn new(keyring_type: impl Into<String>, data: Value) -> Self {
        Self {
            keyring_type: keyring_type.into(),
            data,
        }
    }
}

/// Persisted keyring state.
///
/// Only `booted` and `vault` are ciphertext. `unencrypted_keyring_data` is a
/// cleartext mirror of keyrings that hold no secret.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyringState {
    /// Encrypted sentinel used to verify a password cheaply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booted: Option<String>,
    /// Encrypted blob holding every serialized keyring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault: Option<String>,
    /// Cleartext mirror of non-secret keyrings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unencrypted_keyring_data: Option<Vec<SerializedKeyring>>,
    /// At least one secret-bearing keyring is stored in the vault.
    #[serde(default)]
    pub has_encrypted_keyring_data: bool,
}

/// Handle to a live keyring inside a service instance.
///
/// Ids are assigned when a keyring enters the in-memory list and are never
/// reused by the same service, so a stale handle cannot alias a new keyring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyringId(pub u64);

impl fmt::Display for KeyringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "keyring#{}", self.0)
    }
}

/// One account line of a displayed keyring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayedAccount {
    pub address: String,
    pub brand_name: String,
}

/// Read-only view of a keyring for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayedKeyring {
    pub id: KeyringId,
    #[serde(rename = "type")]
    pub keyring_type: String,
    pub accounts: Vec<DisplayedAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_import: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// Flat account listing across keyrings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyringAccount {
    pub address: String,
    pub brand_name: String,
    #[serde(rename = "type")]
    pub keyring_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub by_import: Option<bool>,
}

impl From<&KeyringAccount> for Account {
    fn from(a: &KeyringAccount) -> Self {
        Account::new(a.address.clone(), a.keyring_type.clone(), a.brand_name.clone())
    }
}

/// In-memory state exposed to subscribers. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemStoreState {
    pub is_unlocked: bool,
    pub keyring_types: Vec<String>,
    pub keyrings: Vec<DisplayedKeyring>,
    /// Encrypted pending mnemonic awaiting user backup, or empty.
    pub pre_mnemonics: String,
}

/// What caused the service to enter the unlocked state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnlockScene {
    /// Password submitted on the lock screen.
    Unlock,
    /// A private key import finished.
    ImportPrivateKey,
    /// A mnemonic keyring was created.
    CreateKeyringWithMnemonics,
}

/// EIP-7702 authorization tuple `(chain_id, contract_address, nonce)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip7702Authorization {
    pub chain_id: u64,
    pub contract_address: String,
    pub nonce: u64,
}
