//! Shared helpers for the integration tests.

use std::path::Path;
use std::sync::Arc;

use lockbox_core::types::SerializedKeyring;
use lockbox_service::{JsonFileStore, KdfParams, KeyringService, PasswordEncryptor};
use serde_json::Value;

/// Password used by every test vault.
pub const PASSWORD: &str = "hunter2 but longer";

/// Standard BIP-39 test phrase.
pub const PHRASE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// A well-formed watch-only address.
pub const WATCH_ADDRESS: &str = "0x5b111702d695435d175e2d7fe5a8d7df32137353";

/// Argon2 cost low enough for tests.
pub fn light_kdf() -> KdfParams {
    KdfParams {
        m_cost: 256,
        t_cost: 1,
        p_cost: 1,
    }
}

/// Hex private key made of one repeated byte.
pub fn secret(byte: u8) -> String {
    hex::encode([byte; 32])
}

/// Service over the state file `dir/keyring-state.json`.
///
/// Two services opened on the same directory share persisted state but
/// nothing in memory, which is how a restart looks.
pub fn open_service(dir: &Path) -> KeyringService {
    let store = Arc::new(JsonFileStore::new(dir.join("keyring-state.json")));
    let encryptor = Arc::new(PasswordEncryptor::new(light_kdf()));
    KeyringService::new(store, encryptor)
        .unwrap()
        .with_kdf_params(light_kdf())
}

/// Fresh service on `dir`, booted with [`PASSWORD`] and holding an empty vault.
pub async fn booted_service(dir: &Path) -> KeyringService {
    let service = open_service(dir);
    service.boot(PASSWORD).await.unwrap();
    service.persist_all_keyrings().await.unwrap();
    service
}

/// Recorded merge case: `(origin, incoming, expected)`.
pub fn merge_fixture() -> (Vec<SerializedKeyring>, Vec<SerializedKeyring>, Vec<SerializedKeyring>) {
    let raw = include_str!("../tests/fixtures/merge_vault_1.json");
    let mut value: Value = serde_json::from_str(raw).unwrap();
    let mut take = |key: &str| -> Vec<SerializedKeyring> {
        serde_json::from_value(value[key].take()).unwrap()
    };
    (take("origin"), take("incoming"), take("expected"))
}
