//! Watch-only address keyring. Holds no secret and cannot sign.

use async_trait::async_trait;
use serde_json::{Value, json};

use lockbox_core::address::{is_same_address, is_valid_address, normalize_address};
use lockbox_core::constants::WATCH_KEYRING;
use lockbox_core::error::KeyringError;
use lockbox_core::traits::{Capability, Keyring};

const CAPABILITIES: &[Capability] = &[Capability::RemoveAccount];

#[derive(Debug, Default, Clone)]
pub struct WatchKeyring {
    accounts: Vec<String>,
    pending: Option<String>,
}

impl WatchKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an address for the next [`Keyring::add_accounts`] call.
    pub fn set_account_to_add(&mut self, address: &str) -> Result<(), KeyringError> {
        if !is_valid_address(address) {
            return Err(KeyringError::InvalidAddress(address.to_string()));
        }
        self.pending = Some(normalize_address(address));
        Ok(())
    }

    fn unsigned(&self) -> KeyringError {
        KeyringError::unsupported(WATCH_KEYRING, "signing")
    }
}

/// Parse an `accounts` list from either `{ "accounts": [...] }` or a bare array.
pub(crate) fn accounts_from(data: &Value) -> Result<Vec<String>, KeyringError> {
    let list = match data {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        Value::Object(obj) => match obj.get("accounts") {
            Some(Value::Array(items)) => items,
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(other) => {
                return Err(KeyringError::InvalidData(format!(
                    "accounts must be an array, got {other}"
                )));
            }
        },
        other => {
            return Err(KeyringError::InvalidData(format!(
                "expected accounts, got {other}"
            )));
        }
    };
    list.iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| KeyringError::InvalidAddress(v.to_string()))
        })
        .collect()
}

#[async_trait]
impl Keyring for WatchKeyring {
    fn keyring_type(&self) -> &str {
        WATCH_KEYRING
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    fn serialize(&self) -> Result<Value, KeyringError> {
        Ok(json!({ "accounts": self.accounts }))
    }

    fn deserialize(&mut self, data: Value) -> Result<(), KeyringError> {
        self.accounts = accounts_from(&data)?;
        if let Some(addr) = data.get("accountToAdd").and_then(Value::as_str) {
            self.set_account_to_add(addr)?;
        }
        Ok(())
    }

    fn get_accounts(&self) -> Vec<String> {
        self.accounts.clone()
    }

    async fn add_accounts(&mut self, _n: usize) -> Result<Vec<String>, KeyringError> {
        let Some(address) = self.pending.take() else {
            return Err(KeyringError::InvalidData("no watch address queued".into()));
        };
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
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0x5b111702d695435d175e2d7fe5a8d7df32137353";

    #[tokio::test]
    async fn queued_address_is_added_once() {
        let mut kr = WatchKeyring::new();
        kr.set_account_to_add(ADDR).unwrap();
        assert_eq!(kr.add_accounts(1).await.unwrap(), vec![ADDR.to_string()]);
        kr.set_account_to_add(&ADDR.to_uppercase().replace("0X", "0x")).unwrap();
        assert!(kr.add_accounts(1).await.unwrap().is_empty());
        assert_eq!(kr.get_accounts().len(), 1);
    }

    #[tokio::test]
    async fn add_without_queue_fails() {
        let mut kr = WatchKeyring::new();
        assert!(kr.add_accounts(1).await.is_err());
    }

    #[test]
    fn invalid_address_rejected() {
        let mut kr = WatchKeyring::new();
        assert!(matches!(
            kr.set_account_to_add("0x1234").unwrap_err(),
            KeyringError::InvalidAddress(_)
        ));
    }

    #[test]
    fn deserialize_accepts_object_and_array() {
        let mut kr = WatchKeyring::new();
        kr.deserialize(json!({ "accounts": [ADDR] })).unwrap();
        assert_eq!(kr.get_accounts(), vec![ADDR.to_string()]);
        kr.deserialize(json!([ADDR])).unwrap();
        assert_eq!(kr.serialize().unwrap(), json!({ "accounts": [ADDR] }));
    }

    #[tokio::test]
    async fn signing_is_unsupported() {
        let kr = WatchKeyring::new();
        let err = kr.sign_message(ADDR, "hi", &Value::Null).await.unwrap_err();
        assert_eq!(err.to_string(), "Keyring Watch Address doesn't support signing");
    }

    #[test]
    fn remove_account_case_insensitive() {
        let mut kr = WatchKeyring::new();
        kr.deserialize(json!([ADDR])).unwrap();
        kr.remove_account(&ADDR.to_uppercase(), None).unwrap();
        assert!(kr.get_accounts().is_empty());
        assert!(kr.remove_account(ADDR, None).is_err());
    }
}
