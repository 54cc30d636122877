//! Hardware wallet reference keyrings (Ledger, OneKey, Trezor).
//!
//! The keyring stores only addresses and derivation metadata. Key material
//! stays on the device, reached through a [`DeviceSigner`]. Without a signer
//! every signing call fails with [`KeyringError::Device`].

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use lockbox_core::address::{is_same_address, normalize_address};
use lockbox_core::constants::DEFAULT_HD_PATH;
use lockbox_core::error::KeyringError;
use lockbox_core::traits::{Capability, Keyring};
use lockbox_core::types::{BrandedAccount, Eip7702Authorization};

use crate::keys;

const CAPABILITIES: &[Capability] = &[
    Capability::RemoveAccount,
    Capability::AccountsWithBrand,
    Capability::ForgetDevice,
];

/// Transport to a paired hardware device.
#[async_trait]
pub trait DeviceSigner: Send + Sync {
    /// Address of the account at `hd_path`.
    async fn get_address(&self, hd_path: &str) -> Result<String, KeyringError>;

    /// Sign `payload` with the key at `hd_path`, returning a hex signature.
    async fn sign(&self, hd_path: &str, payload: &[u8]) -> Result<String, KeyringError>;
}

pub struct HardwareKeyring {
    keyring_type: String,
    hd_path: String,
    accounts: Vec<String>,
    account_details: Map<String, Value>,
    extra: Map<String, Value>,
    signer: Option<Arc<dyn DeviceSigner>>,
}

impl fmt::Debug for HardwareKeyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HardwareKeyring")
            .field("keyring_type", &self.keyring_type)
            .field("accounts", &self.accounts)
            .field("connected", &self.signer.is_some())
            .finish()
    }
}

impl HardwareKeyring {
    pub fn new(keyring_type: &str) -> Self {
        Self {
            keyring_type: keyring_type.to_string(),
            hd_path: DEFAULT_HD_PATH.to_string(),
            accounts: Vec::new(),
            account_details: Map::new(),
            extra: Map::new(),
            signer: None,
        }
    }

    pub fn with_signer(keyring_type: &str, signer: Arc<dyn DeviceSigner>) -> Self {
        let mut kr = Self::new(keyring_type);
        kr.signer = Some(signer);
        kr
    }

    pub fn set_signer(&mut self, signer: Option<Arc<dyn DeviceSigner>>) {
        self.signer = signer;
    }

    fn signer(&self) -> Result<&Arc<dyn DeviceSigner>, KeyringError> {
        self.signer
            .as_ref()
            .ok_or_else(|| KeyringError::Device(format!("{} is not connected", self.keyring_type)))
    }

    fn details_for(&self, address: &str) -> Option<&Value> {
        self.account_details
            .iter()
            .find(|(k, _)| is_same_address(k, address))
            .map(|(_, v)| v)
    }

    fn path_for(&self, address: &str) -> Result<String, KeyringError> {
        if !self.accounts.iter().any(|a| is_same_address(a, address)) {
            return Err(KeyringError::AddressNotFound(normalize_address(address)));
        }
        Ok(self
            .details_for(address)
            .and_then(|d| d.get("hdPath"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.hd_path.clone()))
    }

    fn next_index(&self) -> u64 {
        self.account_details
            .values()
            .filter_map(|d| d.get("index").and_then(Value::as_u64))
            .map(|i| i + 1)
            .max()
            .unwrap_or(self.accounts.len() as u64)
    }

    async fn sign_payload(&self, address: &str, payload: &[u8]) -> Result<String, KeyringError> {
        let path = self.path_for(address)?;
        self.signer()?.sign(&path, payload).await
    }
}

#[async_trait]
impl Keyring for HardwareKeyring {
    fn keyring_type(&self) -> &str {
        &self.keyring_type
    }

    fn capabilities(&self) -> &'static [Capability] {
        CAPABILITIES
    }

    fn serialize(&self) -> Result<Value, KeyringError> {
        let mut out = self.extra.clone();
        out.insert("hdPath".into(), Value::String(self.hd_path.clone()));
        out.insert("accounts".into(), json!(self.accounts));
        out.insert("accountDetails".into(), Value::Object(self.account_details.clone()));
        Ok(Value::Object(out))
    }

    fn deserialize(&mut self, data: Value) -> Result<(), KeyringError> {
        let mut obj = match data {
            Value::Null => Map::new(),
            Value::Object(obj) => obj,
            other => {
                return Err(KeyringError::InvalidData(format!(
                    "expected hardware keyring object, got {other}"
                )));
            }
        };
        self.hd_path = obj
            .remove("hdPath")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_HD_PATH.to_string());
        self.accounts = match obj.remove("accounts") {
            Some(v) => crate::watch::accounts_from(&v)?,
            None => Vec::new(),
        };
        self.account_details = match obj.remove("accountDetails") {
            Some(Value::Object(details)) => details,
            _ => Map::new(),
        };
        self.extra = obj;
        Ok(())
    }

    fn get_accounts(&self) -> Vec<String> {
        self.accounts.clone()
    }

    async fn add_accounts(&mut self, n: usize) -> Result<Vec<String>, KeyringError> {
        let signer = Arc::clone(self.signer()?);
        let mut index = self.next_index();
        let mut added = Vec::with_capacity(n);
        for _ in 0..n {
            let path = format!("{}/{}", self.hd_path, index);
            let address = normalize_address(&signer.get_address(&path).await?);
            if !self.accounts.iter().any(|a| is_same_address(a, &address)) {
                self.accounts.push(address.clone());
                self.account_details.insert(
                    address.clone(),
                    json!({ "hdPath": path, "hdPathType": "BIP44", "index": index }),
                );
                added.push(address);
            }
            index += 1;
        }
        Ok(added)
    }

    async fn sign_transaction(
        &self,
        address: &str,
        tx: &Value,
        _opts: &Value,
    ) -> Result<String, KeyringError> {
        self.sign_payload(address, &keys::transaction_bytes(tx)?).await
    }

    async fn sign_message(
        &self,
        address: &str,
        data: &str,
        _opts: &Value,
    ) -> Result<String, KeyringError> {
        self.sign_payload(address, &keys::message_bytes(data)).await
    }

    async fn sign_personal_message(
        &self,
        address: &str,
        data: &str,
        _opts: &Value,
    ) -> Result<String, KeyringError> {
        self.sign_payload(address, &keys::personal_message_bytes(data))
            .await
    }

    async fn sign_typed_data(
        &self,
        address: &str,
        data: &Value,
        opts: &Value,
    ) -> Result<String, KeyringError> {
        self.sign_payload(address, &keys::typed_data_bytes(data, opts)?)
            .await
    }

    fn remove_account(&mut self, address: &str, _brand: Option<&str>) -> Result<(), KeyringError> {
        let before = self.accounts.len();
        self.accounts.retain(|a| !is_same_address(a, address));
        if self.accounts.len() == before {
            return Err(KeyringError::AddressNotFound(normalize_address(address)));
        }
        self.account_details.retain(|k, _| !is_same_address(k, address));
        Ok(())
    }

    async fn sign_eip7702_authorization(
        &self,
        _address: &str,
        _authorization: &Eip7702Authorization,
        _opts: &Value,
    ) -> Result<String, KeyringError> {
        Err(KeyringError::unsupported(
            &self.keyring_type,
            "signEip7702Authorization operation",
        ))
    }

    fn get_accounts_with_brand(&self) -> Vec<BrandedAccount> {
        self.accounts
            .iter()
            .map(|address| {
                let details = self.details_for(address);
                let field = |name: &str| {
                    details
                        .and_then(|d| d.get(name))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                };
                BrandedAccount {
                    address: address.clone(),
                    brand_name: field("brandName").unwrap_or_else(|| self.keyring_type.clone()),
                    real_brand_name: field("realBrandName"),
                }
            })
            .collect()
    }

    async fn forget_device(&mut self) -> Result<(), KeyringError> {
        debug!(keyring_type = %self.keyring_type, "forgetting hardware device");
        self.accounts.clear();
        self.account_details.clear();
        self.signer = None;
        Ok(())
    }
}
