//! BIP-39 mnemonic keyring with deterministic child derivation.
//!
//! # Derivation
//!
//! The 64-byte BIP-39 seed is expanded per child with BLAKE3 in key
//! derivation mode:
//!
//! ```text
//! child_secret = blake3::derive_key(CHILD_CONTEXT, seed || hd_path || index_le)
//! ```
//!
//! The keyring's public identifier is the public key of the root key
//! derived the same way under [`ROOT_CONTEXT`].
//!
//! # Serialized form
//!
//! ```json
//! { "mnemonic": "...", "hdPath": "m/44'/60'/0'/0", "activeIndexes": [0, 1],
//!   "accounts": ["0x.."], "accountDetails": { "0x..": { "hdPath": "..",
//!   "hdPathType": "BIP44", "index": 0 } }, "publicKey": "0x..",
//!   "byImport": false, "index": 0, "needPassphrase": false }
//! ```
//!
//! Unknown fields written by other wallets are kept and written back.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use lockbox_core::constants::{DEFAULT_HD_PATH, HD_KEYRING};
use lockbox_core::error::KeyringError;
use lockbox_core::traits::{Capability, Keyring};
use lockbox_core::types::Eip7702Authorization;

use crate::keys::{self, KeyPair};
use crate::mnemonic::{self, Seed};

/// BLAKE3 context for per-account child keys.
pub const CHILD_CONTEXT: &str = "lockbox 2024-01 hd child key";

/// BLAKE3 context for the keyring root key.
pub const ROOT_CONTEXT: &str = "lockbox 2024-01 hd root key";

const HD_PATH_TYPE: &str = "BIP44";

const KNOWN_FIELDS: &[&str] = &[
    "mnemonic",
    "passphrase",
    "hdPath",
    "activeIndexes",
    "accounts",
    "accountDetails",
    "publicKey",
    "byImport",
    "index",
    "needPassphrase",
];

const CAPABILITIES: &[Capability] = &[
    Capability::RemoveAccount,
    Capability::SignEip7702Authorization,
    Capability::ExportAccount,
];

struct Wallet {
    index: u32,
    key: KeyPair,
}

/// Mnemonic-backed keyring.
pub struct HdKeyring {
    mnemonic: Option<Zeroizing<String>>,
    passphrase: Zeroizing<String>,
    seed: Option<Seed>,
    hd_path: String,
    wallets: Vec<Wallet>,
    public_key: Option<String>,
    by_import: bool,
    index: u32,
    need_passphrase: bool,
    extra: Map<String, Value>,
}

impl Default for HdKeyring {
    fn default() -> Self {
        Self {
            mnemonic: None,
            passphrase: Zeroizing::new(String::new()),
            seed: None,
            hd_path: DEFAULT_HD_PATH.to_string(),
            wallets: Vec::new(),
            public_key: None,
            by_import: false,
            index: 0,
            need_passphrase: false,
            extra: Map::new(),
        }
    }
}

impl std::fmt::Debug for HdKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdKeyring")
            .field("hd_path", &self.hd_path)
            .field("accounts", &self.get_accounts())
            .field("public_key", &self.public_key)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl HdKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a keyring from a mnemonic phrase with no derived accounts yet.
    pub fn from_mnemonic(phrase: &str, passphrase: &str) -> Result<Self, KeyringError> {
        let mut kr = Self::new();
        kr.init_from_mnemonic(phrase, passphrase)?;
        Ok(kr)
    }

    /// Whether a mnemonic has been loaded.
    pub fn has_mnemonic(&self) -> bool {
        self.mnemonic.is_some()
    }

    /// Normalized mnemonic phrase. Handle with care.
    pub fn mnemonic(&self) -> Option<&str> {
        self.mnemonic.as_ref().map(|m| m.as_str())
    }

    pub fn hd_path(&self) -> &str {
        &self.hd_path
    }

    /// Derivation indexes of the live accounts, in account order.
    pub fn active_indexes(&self) -> Vec<u32> {
        self.wallets.iter().map(|w| w.index).collect()
    }

    fn init_from_mnemonic(&mut self, phrase: &str, passphrase: &str) -> Result<(), KeyringError> {
        let normalized = mnemonic::normalize_phrase(phrase);
        let seed = mnemonic::mnemonic_to_seed(&normalized, passphrase)?;
        let root = derive_secret(ROOT_CONTEXT, &seed, &self.hd_path, 0);
        self.public_key = Some(format!(
            "0x{}",
            hex::encode(KeyPair::from_secret_bytes(root).public_key_bytes())
        ));
        self.mnemonic = Some(Zeroizing::new(normalized));
        self.passphrase = Zeroizing::new(passphrase.to_string());
        self.seed = Some(seed);
        self.wallets.clear();
        Ok(())
    }

    fn derive(&self, index: u32) -> Result<KeyPair, KeyringError> {
        let seed = self
            .seed
            .as_ref()
            .ok_or_else(|| KeyringError::InvalidData("HD keyring has no mnemonic".into()))?;
        Ok(KeyPair::from_secret_bytes(derive_secret(
            CHILD_CONTEXT,
            seed,
            &self.hd_path,
            index,
        )))
    }

    fn activate(&mut self, index: u32) -> Result<String, KeyringError> {
        if let Some(w) = self.wallets.iter().find(|w| w.index == index) {
            return Ok(w.key.address());
        }
        let key = self.derive(index)?;
        let address = key.address();
        self.wallets.push(Wallet { index, key });
        Ok(address)
    }

    fn keys(&self) -> Vec<KeyPair> {
        self.wallets.iter().map(|w| w.key.clone()).collect()
    }

    fn with_key<T>(
        &self,
        address: &str,
        f: impl FnOnce(&KeyPair) -> Result<T, KeyringError>,
    ) -> Result<T, KeyringError> {
        let keys = self.keys();
        let kp = keys::find_key(&keys, address)?;
        f(kp)
    }
}

fn derive_secret(context: &str, seed: &Seed, hd_path: &str, index: u32) -> [u8; 32] {
    let mut input = Vec::with_capacity(64 + hd_path.len() + 4);
    input.extend_from_slice(seed.as_bytes());
    input.extend_from_slice(hd_path.as_bytes());
    input.extend_from_slice(&index.to_le_bytes());
    let secret = blake3::derive_key(context, &input);
    input.zeroize();
    secret
}

fn indexes_from_details(details: &Map<String, Value>) -> Vec<u32> {
    details
        .values()
        .filter_map(|d| d.get("index").and_then(Value::as_u64))
        .filter_map(|i| u32::try_from(i).ok())
        .collect()
}

#[async_trait]
impl Keyring for HdKeyring {
    fn keyring_type(&self) -> &str {
        HD_KEYRING
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    fn serialize(&self) -> Result<Value, KeyringError> {
        let mut out = self.extra.clone();
        let accounts = self.get_accounts();
        let mut details = Map::new();
        for w in &self.wallets {
            details.insert(
                w.key.address(),
                json!({
                    "hdPath": self.hd_path,
                    "hdPathType": HD_PATH_TYPE,
                    "index": w.index,
                }),
            );
        }
        if let Some(m) = &self.mnemonic {
            out.insert("mnemonic".into(), Value::String(m.to_string()));
        }
        if !self.passphrase.is_empty() {
            out.insert("passphrase".into(), Value::String(self.passphrase.to_string()));
        }
        out.insert("hdPath".into(), Value::String(self.hd_path.clone()));
        out.insert("activeIndexes".into(), json!(self.active_indexes()));
        out.insert("accounts".into(), json!(accounts));
        out.insert("accountDetails".into(), Value::Object(details));
        if let Some(pk) = &self.public_key {
            out.insert("publicKey".into(), Value::String(pk.clone()));
        }
        out.insert("byImport".into(), Value::Bool(self.by_import));
        out.insert("index".into(), json!(self.index));
        out.insert("needPassphrase".into(), Value::Bool(self.need_passphrase));
        Ok(Value::Object(out))
    }

    fn deserialize(&mut self, data: Value) -> Result<(), KeyringError> {
        let mut obj = match data {
            Value::Null => Map::new(),
            Value::Object(obj) => obj,
            other => {
                return Err(KeyringError::InvalidData(format!(
                    "expected HD keyring object, got {other}"
                )));
            }
        };
        *self = Self::default();

        if let Some(path) = obj.get("hdPath").and_then(Value::as_str) {
            self.hd_path = path.to_string();
        }
        self.by_import = obj.get("byImport").and_then(Value::as_bool).unwrap_or(false);
        self.need_passphrase = obj
            .get("needPassphrase")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.index = obj
            .get("index")
            .and_then(Value::as_u64)
            .and_then(|i| u32::try_from(i).ok())
            .unwrap_or(0);

        let phrase = match obj.get("mnemonic") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(Zeroizing::new(s.clone())),
            Some(_) => return Err(KeyringError::InvalidMnemonic("mnemonic must be a string".into())),
        };
        let passphrase = Zeroizing::new(
            obj.get("passphrase")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        );

        let mut indexes: BTreeSet<u32> = obj
            .get("activeIndexes")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_u64)
                    .filter_map(|i| u32::try_from(i).ok())
                    .collect()
            })
            .unwrap_or_default();
        if let Some(details) = obj.get("accountDetails").and_then(Value::as_object) {
            indexes.extend(indexes_from_details(details));
        }

        for field in KNOWN_FIELDS {
            if let Some(mut v) = obj.remove(*field) {
                if *field == "mnemonic" || *field == "passphrase" {
                    if let Value::String(s) = &mut v {
                        s.zeroize();
                    }
                }
            }
        }
        self.extra = obj;

        if let Some(phrase) = phrase {
            self.init_from_mnemonic(&phrase, &passphrase)?;
            for index in indexes {
                self.activate(index)?;
            }
        }
        Ok(())
    }

    fn get_accounts(&self) -> Vec<String> {
        self.wallets.iter().map(|w| w.key.address()).collect()
    }

    async fn add_accounts(&mut self, n: usize) -> Result<Vec<String>, KeyringError> {
        if self.mnemonic.is_none() {
            debug!("HD keyring has no mnemonic, generating one");
            let phrase = Zeroizing::new(mnemonic::generate_mnemonic());
            let passphrase = self.passphrase.clone();
            self.init_from_mnemonic(&phrase, &passphrase)?;
        }
        let mut next = self.wallets.iter().map(|w| w.index + 1).max().unwrap_or(0);
        let mut added = Vec::with_capacity(n);
        for _ in 0..n {
            added.push(self.activate(next)?);
            next += 1;
        }
        debug!(count = added.len(), next_index = next, "derived HD accounts");
        Ok(added)
    }

    async fn sign_transaction(
        &self,
        address: &str,
        tx: &Value,
        _opts: &Value,
    ) -> Result<String, KeyringError> {
        let payload = keys::transaction_bytes(tx)?;
        self.with_key(address, |kp| Ok(kp.sign_hex(&payload)))
    }

    async fn sign_message(
        &self,
        address: &str,
        data: &str,
        _opts: &Value,
    ) -> Result<String, KeyringError> {
        let payload = keys::message_bytes(data);
        self.with_key(address, |kp| Ok(kp.sign_hex(&payload)))
    }

    async fn sign_personal_message(
        &self,
        address: &str,
        data: &str,
        _opts: &Value,
    ) -> Result<String, KeyringError> {
        let payload = keys::personal_message_bytes(data);
        self.with_key(address, |kp| Ok(kp.sign_hex(&payload)))
    }

    async fn sign_typed_data(
        &self,
        address: &str,
        data: &Value,
        opts: &Value,
    ) -> Result<String, KeyringError> {
        let payload = keys::typed_data_bytes(data, opts)?;
        self.with_key(address, |kp| Ok(kp.sign_hex(&payload)))
    }

    fn remove_account(&mut self, address: &str, _brand: Option<&str>) -> Result<(), KeyringError> {
        let target = self.with_key(address, |kp| Ok(kp.address()))?;
        self.wallets.retain(|w| w.key.address() != target);
        Ok(())
    }

    async fn sign_eip7702_authorization(
        &self,
        address: &str,
        authorization: &Eip7702Authorization,
        _opts: &Value,
    ) -> Result<String, KeyringError> {
        let payload = keys::eip7702_bytes(authorization)?;
        self.with_key(address, |kp| Ok(kp.sign_hex(&payload)))
    }

    async fn export_account(&self, address: &str) -> Result<String, KeyringError> {
        self.with_key(address, |kp| Ok(kp.secret_hex()))
    }

    fn public_key(&self) -> Option<String> {
        self.public_key.clone()
    }

    fn by_import(&self) -> Option<bool> {
        Some(self.by_import)
    }

    fn hd_index(&self) -> Option<u32> {
        Some(self.index)
    }

    fn set_hd_index(&mut self, index: u32) {
        self.index = index;
    }
}
