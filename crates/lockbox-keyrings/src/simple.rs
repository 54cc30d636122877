//! Raw private key keyring.
//!
//! Serialized form is a JSON array of hex private keys, one per account:
//! `["4c0883a6...", ...]`.

use async_trait::async_trait;
use serde_json::Value;

use lockbox_core::constants::SIMPLE_KEYRING;
use lockbox_core::error::KeyringError;
use lockbox_core::traits::{Capability, Keyring};
use lockbox_core::types::Eip7702Authorization;

use crate::keys::{self, KeyPair};

const CAPABILITIES: &[Capability] = &[
    Capability::RemoveAccount,
    Capability::SignEip7702Authorization,
    Capability::ExportAccount,
];

/// Keyring holding imported or generated standalone private keys.
#[derive(Debug, Default, Clone)]
pub struct SimpleKeyring {
    keys: Vec<KeyPair>,
}

impl SimpleKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a keyring from hex private keys.
    pub fn from_private_keys<S: AsRef<str>>(secrets: &[S]) -> Result<Self, KeyringError> {
        let keys = secrets
            .iter()
            .map(|s| KeyPair::from_hex(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { keys })
    }
}

#[async_trait]
impl Keyring for SimpleKeyring {
    fn keyring_type(&self) -> &str {
        SIMPLE_KEYRING
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    fn serialize(&self) -> Result<Value, KeyringError> {
        Ok(Value::Array(
            self.keys.iter().map(|k| Value::String(k.secret_hex())).collect(),
        ))
    }

    fn deserialize(&mut self, data: Value) -> Result<(), KeyringError> {
        let secrets = match data {
            Value::Null => Vec::new(),
            Value::Array(items) => items,
            other => {
                return Err(KeyringError::InvalidData(format!(
                    "expected array of private keys, got {other}"
                )));
            }
        };
        let mut keys = Vec::with_capacity(secrets.len());
        for item in secrets {
            let secret = item
                .as_str()
                .ok_or_else(|| KeyringError::InvalidKey("private key must be a string".into()))?;
            keys.push(KeyPair::from_hex(secret)?);
        }
        self.keys = keys;
        Ok(())
    }

    fn get_accounts(&self) -> Vec<String> {
        self.keys.iter().map(KeyPair::address).collect()
    }

    async fn add_accounts(&mut self, n: usize) -> Result<Vec<String>, KeyringError> {
        let mut added = Vec::with_capacity(n);
        for _ in 0..n {
            let kp = KeyPair::generate();
            added.push(kp.address());
            self.keys.push(kp);
        }
        Ok(added)
    }

    async fn sign_transaction(
        &self,
        address: &str,
        tx: &Value,
        _opts: &Value,
    ) -> Result<String, KeyringError> {
        let kp = keys::find_key(&self.keys, address)?;
        Ok(kp.sign_hex(&keys::transaction_bytes(tx)?))
    }

    async fn sign_message(
        &self,
        address: &str,
        data: &str,
        _opts: &Value,
    ) -> Result<String, KeyringError> {
        let kp = keys::find_key(&self.keys, address)?;
        Ok(kp.sign_hex(&keys::message_bytes(data)))
    }

    async fn sign_personal_message(
        &self,
        address: &str,
        data: &str,
        _opts: &Value,
    ) -> Result<String, KeyringError> {
        let kp = keys::find_key(&self.keys, address)?;
        Ok(kp.sign_hex(&keys::personal_message_bytes(data)))
    }

    async fn sign_typed_data(
        &self,
        address: &str,
        data: &Value,
        opts: &Value,
    ) -> Result<String, KeyringError> {
        let kp = keys::find_key(&self.keys, address)?;
        Ok(kp.sign_hex(&keys::typed_data_bytes(data, opts)?))
    }

    fn remove_account(&mut self, address: &str, _brand: Option<&str>) -> Result<(), KeyringError> {
        let kp = keys::find_key(&self.keys, address)?;
        let target = kp.address();
        self.keys.retain(|k| k.address() != target);
        Ok(())
    }

    async fn sign_eip7702_authorization(
        &self,
        address: &str,
        authorization: &Eip7702Authorization,
        _opts: &Value,
    ) -> Result<String, KeyringError> {
        let kp = keys::find_key(&self.keys, address)?;
        Ok(kp.sign_hex(&keys::eip7702_bytes(authorization)?))
    }

    async fn export_account(&self, address: &str) -> Result<String, KeyringError> {
        Ok(keys::find_key(&self.keys, address)?.secret_hex())
    }

    fn by_import(&self) -> Option<bool> {
        Some(true)
    }
}
