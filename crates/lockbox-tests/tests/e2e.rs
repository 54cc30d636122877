//! End-to-end tests for the keyring service.
//!
//! Each test works on a real JSON state file in a temp directory. A
//! "restart" opens a second service on the same directory.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use lockbox_core::constants::{HD_KEYRING, LEDGER_KEYRING, SIMPLE_KEYRING, WATCH_KEYRING};
use lockbox_core::error::KeyringError;
use lockbox_core::traits::Keyring;
use lockbox_core::types::{Account, Eip7702Authorization, SerializedKeyring, UnlockScene};
use lockbox_keyrings::{DeviceSigner, HardwareKeyring, HdKeyring, KeyPair};
use lockbox_service::{AccountAliasHook, KeyringEvent, ServiceError};
use lockbox_tests::helpers::*;

/// Device stand-in: one key per derivation path.
struct FakeDevice;

fn device_key(hd_path: &str) -> KeyPair {
    let last = hd_path.bytes().last().unwrap_or(0);
    KeyPair::from_secret_bytes([last.wrapping_add(1); 32])
}

#[async_trait]
impl DeviceSigner for FakeDevice {
    async fn get_address(&self, hd_path: &str) -> Result<String, KeyringError> {
        Ok(device_key(hd_path).address())
    }

    async fn sign(&self, hd_path: &str, payload: &[u8]) -> Result<String, KeyringError> {
        Ok(device_key(hd_path).sign_hex(payload))
    }
}

#[derive(Default)]
struct RecordingHook {
    seen: Mutex<Vec<(String, Account)>>,
}

#[async_trait]
impl AccountAliasHook for RecordingHook {
    async fn on_new_account(&self, keyring_type: &str, account: &Account) {
        self.seen.lock().push((keyring_type.to_string(), account.clone()));
    }
}

// ======================================================================
// Lock / unlock lifecycle
// ======================================================================

#[tokio::test]
async fn e2e_accounts_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    service.import_private_key(&secret(7)).await.unwrap();
    let hd = service.create_keyring_with_mnemonics(PHRASE).await.unwrap();
    service.add_new_account(hd).await.unwrap();
    let before = service.get_accounts().await;
    assert_eq!(before.len(), 3);

    let restarted = open_service(dir.path());
    assert!(!restarted.is_unlocked());
    assert!(restarted.get_accounts().await.is_empty());
    restarted.submit_password(PASSWORD).await.unwrap();
    assert_eq!(restarted.get_accounts().await, before);
}

#[tokio::test]
async fn e2e_wrong_password_keeps_service_locked() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    service.import_private_key(&secret(1)).await.unwrap();

    let restarted = open_service(dir.path());
    let err = restarted.submit_password("nope").await.unwrap_err();
    assert!(err.is_invalid_password());
    assert!(!restarted.is_unlocked());
    assert!(restarted.get_accounts().await.is_empty());
}

#[tokio::test]
async fn e2e_set_locked_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    service.import_private_key(&secret(2)).await.unwrap();
    let mut events = service.subscribe();

    let first = service.set_locked().await;
    let second = service.set_locked().await;
    assert_eq!(first, second);
    assert!(!first.is_unlocked);
    assert!(first.keyrings.is_empty());
    assert_eq!(events.try_recv().unwrap(), KeyringEvent::Locked);

    // Locked state has no password, so nothing can be mutated.
    let err = service.import_private_key(&secret(3)).await.unwrap_err();
    assert_eq!(err, ServiceError::PasswordNotSet);

    service.submit_password(PASSWORD).await.unwrap();
    assert_eq!(service.get_accounts().await.len(), 1);
}

#[tokio::test]
async fn e2e_unlock_emits_scene() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    service.set_locked().await;
    let mut events = service.subscribe();
    service.submit_password(PASSWORD).await.unwrap();

    let scenes: Vec<UnlockScene> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|e| match e {
            KeyringEvent::Unlocked { scene } => Some(scene),
            _ => None,
        })
        .collect();
    assert_eq!(scenes, vec![UnlockScene::Unlock]);
}

#[tokio::test]
async fn e2e_unlock_writes_missing_mirror() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    service.import_private_key(&secret(4)).await.unwrap();

    // A state written before the mirror existed.
    let mut state = service.keyring_state().await;
    state.unencrypted_keyring_data = None;
    service.load_store(state).await.unwrap();

    let restarted = open_service(dir.path());
    assert!(!restarted.saved_unencrypted_keyring_data().await);
    restarted.submit_password(PASSWORD).await.unwrap();
    assert!(restarted.saved_unencrypted_keyring_data().await);
}

#[tokio::test]
async fn e2e_corrupt_vault_unlocks_empty_and_is_not_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    let mut state = service.keyring_state().await;
    state.unencrypted_keyring_data = None;
    state.vault = Some("not a vault".into());
    service.load_store(state).await.unwrap();

    let restarted = open_service(dir.path());
    let mem = restarted.submit_password(PASSWORD).await.unwrap();
    assert!(mem.is_unlocked);
    assert!(mem.keyrings.is_empty());
    assert_eq!(
        restarted.keyring_state().await.vault.as_deref(),
        Some("not a vault")
    );
}

// ======================================================================
// Import and duplicates
// ======================================================================

#[tokio::test]
async fn e2e_duplicate_key_rejected_without_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    service.import_private_key(&secret(5)).await.unwrap();
    let state = service.keyring_state().await;
    let mem = service.mem_state();

    let err = service.import_private_key(&secret(5)).await.unwrap_err();
    let address = KeyPair::from_secret_bytes([5; 32]).address();
    assert_eq!(
        err.to_string(),
        format!("The account you're are trying to import is a duplicate: {address}")
    );
    assert_eq!(service.keyring_state().await, state);
    assert_eq!(service.mem_state(), mem);
}

#[tokio::test]
async fn e2e_same_address_in_different_types_is_allowed() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    let address = KeyPair::from_secret_bytes([6; 32]).address();
    service
        .add_new_keyring(WATCH_KEYRING, json!({ "accounts": [address] }))
        .await
        .unwrap();
    service.import_private_key(&secret(6)).await.unwrap();

    let id = service
        .get_keyring_for_account(&address, None, false)
        .await
        .unwrap();
    assert_eq!(
        service.get_keyring_by_type(SIMPLE_KEYRING).await,
        Some(id)
    );
    let watch = service
        .get_keyring_for_account(&address, Some(WATCH_KEYRING), true)
        .await
        .unwrap();
    assert_ne!(watch, id);
}

#[tokio::test]
async fn e2e_alias_hook_sees_new_accounts() {
    let dir = tempfile::tempdir().unwrap();
    let hook = Arc::new(RecordingHook::default());
    let service = open_service(dir.path()).with_alias_hook(hook.clone());
    service.boot(PASSWORD).await.unwrap();

    service.import_private_key(&secret(8)).await.unwrap();
    let hd = service.create_keyring_with_mnemonics(PHRASE).await.unwrap();
    service.add_new_account(hd).await.unwrap();

    let seen = hook.seen.lock();
    let types: Vec<&str> = seen.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(types, vec![SIMPLE_KEYRING, HD_KEYRING, HD_KEYRING]);
}

// ======================================================================
// Account removal
// ======================================================================

#[tokio::test]
async fn e2e_remove_one_of_many_keeps_keyring() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    let hd = service.create_keyring_with_mnemonics(PHRASE).await.unwrap();
    service.add_new_account(hd).await.unwrap();
    let accounts = service.keyring_accounts(hd).await.unwrap();

    let mut events = service.subscribe();
    let mem = service
        .remove_account(&accounts[1], HD_KEYRING, None, true)
        .await
        .unwrap();
    assert_eq!(mem.keyrings.len(), 1);
    assert_eq!(service.keyring_accounts(hd).await.unwrap(), vec![accounts[0].clone()]);
    assert!(matches!(
        events.try_recv().unwrap(),
        KeyringEvent::RemovedAccount(a) if a.address == accounts[1]
    ));

    let restarted = open_service(dir.path());
    restarted.submit_password(PASSWORD).await.unwrap();
    assert_eq!(restarted.get_accounts().await, vec![accounts[0].clone()]);
}

#[tokio::test]
async fn e2e_remove_last_account_can_keep_empty_keyring() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    let id = service.import_private_key(&secret(9)).await.unwrap();
    let address = service.keyring_accounts(id).await.unwrap().remove(0);

    service
        .remove_account(&address, SIMPLE_KEYRING, None, false)
        .await
        .unwrap();
    assert_eq!(service.get_keyrings_by_type(SIMPLE_KEYRING).await, vec![id]);
    // An empty private key keyring carries no secret.
    assert!(!service.has_encrypted_keyring_data().await);

    service.remove_empty_keyrings().await;
    assert!(service.get_keyrings_by_type(SIMPLE_KEYRING).await.is_empty());
}

#[tokio::test]
async fn e2e_gnosis_account_removal_supported() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    service
        .add_new_keyring(
            "Gnosis",
            json!({ "accounts": [WATCH_ADDRESS], "networkIdMap": { WATCH_ADDRESS: ["1"] } }),
        )
        .await
        .unwrap();
    let mem = service
        .remove_account(WATCH_ADDRESS, "Gnosis", None, true)
        .await
        .unwrap();
    assert!(mem.keyrings.is_empty());
}

#[tokio::test]
async fn e2e_hardware_keyring_forgets_device_on_last_removal() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    let id = service
        .add_keyring(Box::new(HardwareKeyring::with_signer(
            LEDGER_KEYRING,
            Arc::new(FakeDevice),
        )))
        .await
        .unwrap();
    let added = service.add_new_account(id).await.unwrap();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].brand_name, LEDGER_KEYRING);

    let sig = service
        .sign_message(&added[0].address, "0x01", &Value::Null)
        .await
        .unwrap();
    assert!(!sig.is_empty());

    // Hardware keyrings are mirrored in the clear.
    assert_eq!(
        service.get_unencrypted_keyring_types().await,
        vec![LEDGER_KEYRING.to_string()]
    );

    service
        .remove_account(&added[0].address, LEDGER_KEYRING, Some(LEDGER_KEYRING), true)
        .await
        .unwrap();
    assert!(service.get_keyrings_by_type(LEDGER_KEYRING).await.is_empty());
    assert!(!service.has_address(&added[0].address).await);
}

// ======================================================================
// Passwords
// ======================================================================

#[tokio::test]
async fn e2e_update_password_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    service.import_private_key(&secret(10)).await.unwrap();
    let mut events = service.subscribe();

    let err = service.update_password("wrong", "next").await.unwrap_err();
    assert!(err.is_invalid_password());
    service.update_password(PASSWORD, "next").await.unwrap();
    assert!(matches!(
        events.try_recv().unwrap(),
        KeyringEvent::BeforeUpdatePassword { .. }
    ));

    let restarted = open_service(dir.path());
    assert!(restarted.submit_password(PASSWORD).await.unwrap_err().is_invalid_password());
    restarted.submit_password("next").await.unwrap();
    assert_eq!(restarted.get_accounts().await.len(), 1);
}

#[tokio::test]
async fn e2e_reset_password_only_without_accounts() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    service.reset_password("fresh").await.unwrap();
    service.verify_password("fresh").await.unwrap();

    service.import_private_key(&secret(11)).await.unwrap();
    let err = service.reset_password("again").await.unwrap_err();
    assert_eq!(err, ServiceError::AccountsExist);
    service.verify_password("fresh").await.unwrap();
}

#[tokio::test]
async fn e2e_dangerous_reset_wipes_keyrings() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    service.import_private_key(&secret(12)).await.unwrap();

    service
        .dangerously_reset_password_and_keyrings(PASSWORD, Some("other"))
        .await
        .unwrap();
    assert!(service.get_accounts().await.is_empty());

    let restarted = open_service(dir.path());
    restarted.submit_password("other").await.unwrap();
    assert!(restarted.get_accounts().await.is_empty());
    assert!(!restarted.has_encrypted_keyring_data().await);
}

#[tokio::test]
async fn e2e_dangerous_reset_without_password_drops_vault() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    service.import_private_key(&secret(13)).await.unwrap();

    service
        .dangerously_reset_password_and_keyrings(PASSWORD, None)
        .await
        .unwrap();
    assert!(!service.has_vault().await);
    assert!(!service.is_booted().await);
    assert_eq!(
        service.verify_password(PASSWORD).await.unwrap_err(),
        ServiceError::NoVault
    );
}

// ======================================================================
// Signing
// ======================================================================

#[tokio::test]
async fn e2e_eip7702_supported_only_by_software_keys() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    let id = service.import_private_key(&secret(14)).await.unwrap();
    let address = service.keyring_accounts(id).await.unwrap().remove(0);
    service
        .add_new_keyring(WATCH_KEYRING, json!({ "accounts": [WATCH_ADDRESS] }))
        .await
        .unwrap();

    let auth = Eip7702Authorization {
        chain_id: 1,
        contract_address: WATCH_ADDRESS.into(),
        nonce: 3,
    };
    let sig = service
        .sign_eip7702_authorization(&address, &auth, &Value::Null)
        .await
        .unwrap();
    assert!(!sig.is_empty());

    let err = service
        .sign_eip7702_authorization(WATCH_ADDRESS, &auth, &Value::Null)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("signEip7702Authorization"));
}

#[tokio::test]
async fn e2e_watch_account_cannot_sign() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    service
        .add_new_keyring(WATCH_KEYRING, json!({ "accounts": [WATCH_ADDRESS] }))
        .await
        .unwrap();
    let err = service
        .sign_transaction(WATCH_ADDRESS, &json!({ "nonce": 0 }), &Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Keyring Watch Address doesn't support signing");
}

#[tokio::test]
async fn e2e_unknown_signer_has_no_keyring() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    let err = service
        .sign_message(WATCH_ADDRESS, "0x00", &Value::Null)
        .await
        .unwrap_err();
    assert_eq!(err, ServiceError::NoKeyringForAccount);
}

// ======================================================================
// Visible account queries
// ======================================================================

#[tokio::test]
async fn e2e_visible_accounts_skip_empty_keyrings() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    service.import_private_key(&secret(15)).await.unwrap();
    service
        .add_keyring(Box::new(HardwareKeyring::new(LEDGER_KEYRING)))
        .await
        .unwrap();

    assert_eq!(service.get_all_typed_accounts().await.len(), 2);
    assert_eq!(service.get_all_typed_visible_accounts().await.len(), 1);
    let flat = service.get_all_visible_accounts_array().await;
    assert_eq!(flat.len(), 1);
    assert_eq!(flat[0].keyring_type, SIMPLE_KEYRING);
    assert_eq!(flat[0].by_import, Some(true));
    assert_eq!(service.get_count_of_accounts_in_keyring().await, 1);
}

// ======================================================================
// Extension sync
// ======================================================================

async fn extension_hd_entry(count: usize) -> SerializedKeyring {
    let mut hd = HdKeyring::from_mnemonic(PHRASE, "").unwrap();
    hd.add_accounts(count).await.unwrap();
    let mut data = hd.serialize().unwrap();
    // The extension does not always keep `accounts` in step with details.
    data["accounts"] = json!([]);
    SerializedKeyring::new(HD_KEYRING, data)
}

#[tokio::test]
async fn e2e_sync_merges_extension_vault() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    let hd = service.create_keyring_with_mnemonics(PHRASE).await.unwrap();
    let local = service.keyring_accounts(hd).await.unwrap();
    assert_eq!(local.len(), 1);

    let key = KeyPair::from_secret_bytes([16; 32]);
    let vault = vec![
        extension_hd_entry(3).await,
        SerializedKeyring::new(SIMPLE_KEYRING, json!([key.secret_hex()])),
        SerializedKeyring::new(WATCH_KEYRING, json!({ "accounts": [WATCH_ADDRESS] })),
    ];
    let added = service.sync_extension_data(vault.clone()).await.unwrap();
    let mut added_types: Vec<&str> = added.iter().map(|a| a.keyring_type.as_str()).collect();
    added_types.sort_unstable();
    assert_eq!(
        added_types,
        vec![HD_KEYRING, HD_KEYRING, SIMPLE_KEYRING, WATCH_KEYRING]
    );
    assert!(!added.iter().any(|a| a.address == local[0]));

    // One HD keyring holding the union, no duplicate.
    assert_eq!(service.get_keyrings_by_type(HD_KEYRING).await.len(), 1);
    assert_eq!(service.get_accounts().await.len(), 5);
    assert!(service.has_address(&key.address()).await);

    // Syncing the same vault again introduces nothing.
    assert!(service.sync_extension_data(vault).await.unwrap().is_empty());
    assert_eq!(service.get_accounts().await.len(), 5);

    let restarted = open_service(dir.path());
    restarted.submit_password(PASSWORD).await.unwrap();
    assert_eq!(restarted.get_accounts().await.len(), 5);
}

#[tokio::test]
async fn e2e_sync_does_not_duplicate_imported_key() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    service.import_private_key(&secret(0xAB)).await.unwrap();
    let address = KeyPair::from_secret_bytes([0xAB; 32]).address();

    // Same key, spelled the way other wallets export it.
    let vault = vec![
        SerializedKeyring::new(SIMPLE_KEYRING, json!([format!("0x{}", secret(0xAB))])),
        SerializedKeyring::new(SIMPLE_KEYRING, json!([secret(0xAB).to_uppercase()])),
    ];
    let added = service.sync_extension_data(vault).await.unwrap();
    assert!(added.is_empty());
    assert_eq!(service.get_keyrings_by_type(SIMPLE_KEYRING).await.len(), 1);
    assert_eq!(service.get_accounts().await, vec![address.clone()]);

    let restarted = open_service(dir.path());
    restarted.submit_password(PASSWORD).await.unwrap();
    assert_eq!(restarted.get_keyrings_by_type(SIMPLE_KEYRING).await.len(), 1);
    assert_eq!(restarted.get_accounts().await, vec![address]);
}

#[tokio::test]
async fn e2e_sync_reports_new_key_once() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    let vault = vec![
        SerializedKeyring::new(SIMPLE_KEYRING, json!([secret(0x21)])),
        SerializedKeyring::new(SIMPLE_KEYRING, json!([format!("0X{}", secret(0x21))])),
    ];
    let added = service.sync_extension_data(vault).await.unwrap();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].address, KeyPair::from_secret_bytes([0x21; 32]).address());
    assert_eq!(service.get_keyrings_by_type(SIMPLE_KEYRING).await.len(), 1);
}

#[tokio::test]
async fn e2e_sync_requires_unlock() {
    let dir = tempfile::tempdir().unwrap();
    let service = booted_service(dir.path()).await;
    service.set_locked().await;
    let err = service.sync_extension_data(Vec::new()).await.unwrap_err();
    assert_eq!(err, ServiceError::PasswordNotSet);
}
