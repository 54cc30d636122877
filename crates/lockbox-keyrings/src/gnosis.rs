//! Gnosis Safe multisig reference keyring.
//!
//! Tracks Safe addresses and the networks each is deployed on. Signing goes
//! through the Safe's owners, never through this keyring.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use lockbox_core::address::{is_same_address, normalize_address};
use lockbox_core::constants::GNOSIS_KEYRING;
use lockbox_core::error::KeyringError;
use lockbox_core::traits::{Capability, Keyring};

const CAPABILITIES: &[Capability] = &[Capability::RemoveAccount];

#[derive(Debug, Default, Clone)]
pub struct GnosisKeyring {
    accounts: Vec<String>,
    network_id_map: Map<String, Value>,
    pending: Option<(String, Vec<String>)>,
}

impl GnosisKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a Safe for the next [`Keyring::add_accounts`] call.
    pub fn set_account_to_add(&mut self, address: &str, network_ids: Vec<String>) {
        self.pending = Some((normalize_address(address), network_ids));
    }

    /// Networks a Safe is deployed on.
    pub fn network_ids(&self, address: &str) -> Vec<String> {
        self.network_id_map
            .iter()
            .find(|(k, _)| is_same_address(k, address))
            .and_then(|(_, v)| v.as_array())
            .map(|ids| ids.iter().filter_map(|i| i.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    fn unsigned(&self) -> KeyringError {
        KeyringError::unsupported(GNOSIS_KEYRING, "direct signing")
    }
}

#[async_trait]
impl Keyring for GnosisKeyring {
    fn keyring_type(&self) -> &str {
        GNOSIS_KEYRING
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    fn serialize(&self) -> Result<Value, KeyringError> {
        Ok(json!({
            "accounts": self.accounts,
            "networkIdMap": self.network_id_map,
        }))
    }

    fn deserialize(&mut self, data: Value) -> Result<(), KeyringError> {
        self.accounts = crate::watch::accounts_from(&data)?;
        self.network_id_map = data
            .get("networkIdMap")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Ok(())
    }

    fn get_accounts(&self) -> Vec<String> {
        self.accounts.clone()
    }

    async fn add_accounts(&mut self, _n: usize) -> Result<Vec<String>, KeyringError> {
        let Some((address, networks)) = self.pending.take() else {
            return Err(KeyringError::InvalidData("no safe address queued".into()));
        };
        self.network_id_map.insert(address.clone(), json!(networks));
        if self.accounts.iter().any(|a| is_same_address(a, &address)) {
            return Ok(Vec::new());
        }
        self.accounts.push(address.clone());
        Ok(vec![address])
    }

    async fn sign_transaction(&self, _: &str, _: &Value, _: &Value) -> Result<String, KeyringError> {
        Err(self.unsigned())
    }

    async fn sign_message(&self, _: &str, _: &str, _: &Value) -> Result<String, KeyringError> {
        Err(self.unsigned())
    }

    async fn sign_personal_message(&self, _: &str, _: &str, _: &Value) -> Result<String, KeyringError> {
        Err(self.unsigned())
    }

    async fn sign_typed_data(&self, _: &str, _: &Value, _: &Value) -> Result<String, KeyringError> {
        Err(self.unsigned())
    }

    fn remove_account(&mut self, address: &str, _brand: Option<&str>) -> Result<(), KeyringError> {
        let before = self.accounts.len();
        self.accounts.retain(|a| !is_same_address(a, address));
        if self.accounts.len() == before {
            return Err(KeyringError::AddressNotFound(normalize_address(address)));
        }
        self.network_id_map.retain(|k, _| !is_same_address(k, address));
        Ok(())
    }
}
