//! The keyring service: lock/unlock state machine and mutation API.
//!
//! [`KeyringService`] owns the in-memory password, the live keyring list
//! and the persisted [`KeyringState`]. Every vault-mutating operation runs
//! under one async mutex and ends with a full re-encryption of the keyring
//! list (`persist_all`), so the persisted vault never lags the in-memory
//! list once an operation has returned.
//!
//! The display mirror ([`MemStoreState`]) lives outside the mutex so that
//! readers and a re-entrant `submit_password` never wait on a writer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Value, json};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use lockbox_core::address::{is_same_address, normalize_address, strip_hex_prefix};
use lockbox_core::constants::{
    BOOTED_SENTINEL, HD_KEYRING, SIMPLE_KEYRING, WATCH_KEYRING, is_secret_type,
};
use lockbox_core::error::{EncryptorError, KeyringError};
use lockbox_core::traits::{Capability, Encryptor, Keyring, KeyringStore};
use lockbox_core::types::{
    Account, DisplayedAccount, DisplayedKeyring, Eip7702Authorization, KeyringAccount, KeyringId,
    KeyringState, MemStoreState, SerializedKeyring, UnlockScene,
};
use lockbox_keyrings::{KeyringRegistry, mnemonic};

use crate::cipher::KdfParams;
use crate::config::{DEFAULT_EVENT_CAPACITY, ServiceConfig};
use crate::encryptor::PasswordEncryptor;
use crate::error::{Result, ServiceError};
use crate::events::KeyringEvent;
use crate::merge::merge_vault;
use crate::password::{self, Password};
use crate::store::JsonFileStore;

/// Callback invoked for every account the service adds, e.g. to give it a
/// default alias in an address book.
#[async_trait]
pub trait AccountAliasHook: Send + Sync {
    async fn on_new_account(&self, keyring_type: &str, account: &Account);
}

struct ManagedKeyring {
    id: KeyringId,
    keyring: Box<dyn Keyring>,
}

#[derive(Default)]
struct Inner {
    password: Option<Password>,
    keyrings: Vec<ManagedKeyring>,
    state: KeyringState,
    next_id: u64,
}

impl Inner {
    fn push(&mut self, keyring: Box<dyn Keyring>) -> KeyringId {
        let id = KeyringId(self.next_id);
        self.next_id += 1;
        self.keyrings.push(ManagedKeyring { id, keyring });
        id
    }

    fn replace_keyrings(&mut self, keyrings: Vec<Box<dyn Keyring>>) {
        self.keyrings.clear();
        for keyring in keyrings {
            self.push(keyring);
        }
    }

    fn password(&self) -> Result<&str> {
        self.password
            .as_ref()
            .map(Password::as_str)
            .ok_or(ServiceError::PasswordNotSet)
    }

    fn position(&self, id: KeyringId) -> Result<usize> {
        self.keyrings
            .iter()
            .position(|m| m.id == id)
            .ok_or(ServiceError::UnknownKeyring(id))
    }

    fn keyring(&self, id: KeyringId) -> Result<&dyn Keyring> {
        let idx = self.position(id)?;
        Ok(self.keyrings[idx].keyring.as_ref())
    }
}

/// Resets the submit flag when `submit_password` returns, on every path.
struct SubmitGuard<'a>(&'a AtomicBool);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct KeyringService {
    inner: Mutex<Inner>,
    mem: RwLock<MemStoreState>,
    submitting: AtomicBool,
    encryptor: Arc<dyn Encryptor>,
    registry: KeyringRegistry,
    store: Arc<dyn KeyringStore>,
    events: broadcast::Sender<KeyringEvent>,
    alias_hook: Option<Arc<dyn AccountAliasHook>>,
    kdf: KdfParams,
}

impl std::fmt::Debug for KeyringService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringService")
            .field("mem", &*self.mem.read())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl KeyringService {
    /// Create a service over `store`, loading any previously saved state.
    pub fn new(store: Arc<dyn KeyringStore>, encryptor: Arc<dyn Encryptor>) -> Result<Self> {
        let state = store.load()?.unwrap_or_default();
        let registry = KeyringRegistry::with_defaults();
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        let mem = MemStoreState {
            keyring_types: registry.types(),
            ..MemStoreState::default()
        };
        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                ..Inner::default()
            }),
            mem: RwLock::new(mem),
            submitting: AtomicBool::new(false),
            encryptor,
            registry,
            store,
            events,
            alias_hook: None,
            kdf: KdfParams::default(),
        })
    }

    /// Service backed by the JSON state file named in `config`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let store = Arc::new(JsonFileStore::new(config.state_path()));
        let encryptor = Arc::new(PasswordEncryptor::new(config.kdf_params()));
        Ok(Self::new(store, encryptor)?
            .with_kdf_params(config.kdf_params())
            .with_event_capacity(config.event_capacity))
    }

    /// Replace the keyring registry.
    pub fn with_registry(mut self, registry: KeyringRegistry) -> Self {
        self.mem.write().keyring_types = registry.types();
        self.registry = registry;
        self
    }

    pub fn with_alias_hook(mut self, hook: Arc<dyn AccountAliasHook>) -> Self {
        self.alias_hook = Some(hook);
        self
    }

    /// Cost parameters for [`encrypt_with_password`](Self::encrypt_with_password).
    pub fn with_kdf_params(mut self, params: KdfParams) -> Self {
        self.kdf = params;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        self.events = events;
        self
    }

    /// Subscribe to service events.
    pub fn subscribe(&self) -> broadcast::Receiver<KeyringEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: KeyringEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    // ------------------------------------------------------------------
    // Persisted state
    // ------------------------------------------------------------------

    /// Replace the persisted state, e.g. with a state imported from backup.
    pub async fn load_store(&self, state: KeyringState) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.store.save(&state)?;
        inner.state = state;
        Ok(())
    }

    /// Copy of the persisted state.
    pub async fn keyring_state(&self) -> KeyringState {
        self.inner.lock().await.state.clone()
    }

    /// Copy of the in-memory display state.
    pub fn mem_state(&self) -> MemStoreState {
        self.mem.read().clone()
    }

    pub async fn is_booted(&self) -> bool {
        self.inner.lock().await.state.booted.is_some()
    }

    pub fn is_unlocked(&self) -> bool {
        self.mem.read().is_unlocked
    }

    pub async fn has_vault(&self) -> bool {
        self.inner.lock().await.state.vault.is_some()
    }

    /// Whether the cleartext mirror has ever been written.
    pub async fn saved_unencrypted_keyring_data(&self) -> bool {
        self.inner.lock().await.state.unencrypted_keyring_data.is_some()
    }

    /// Whether the vault holds a mnemonic or private key.
    pub async fn has_encrypted_keyring_data(&self) -> bool {
        self.inner.lock().await.state.has_encrypted_keyring_data
    }

    pub async fn has_unencrypted_keyring_data(&self) -> bool {
        self.inner
            .lock()
            .await
            .state
            .unencrypted_keyring_data
            .as_ref()
            .is_some_and(|d| !d.is_empty())
    }

    pub async fn get_unencrypted_keyring_types(&self) -> Vec<String> {
        self.inner
            .lock()
            .await
            .state
            .unencrypted_keyring_data
            .as_ref()
            .map(|d| d.iter().map(|k| k.keyring_type.clone()).collect())
            .unwrap_or_default()
    }

    /// Drop the booted sentinel.
    pub async fn reset_booted(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let mut next = inner.state.clone();
        next.booted = None;
        self.store.save(&next)?;
        inner.state = next;
        Ok(())
    }

    /// Serialize, partition and encrypt every keyring, then save atomically.
    pub async fn persist_all_keyrings(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.persist_all(&mut inner)
    }

    fn persist_all(&self, inner: &mut Inner) -> Result<()> {
        let password = inner.password()?;

        let mut serialized = Vec::with_capacity(inner.keyrings.len());
        for m in &inner.keyrings {
            serialized.push(SerializedKeyring::new(
                m.keyring.keyring_type(),
                m.keyring.serialize()?,
            ));
        }

        let mut has_encrypted = false;
        let mut unencrypted = Vec::new();
        for entry in &serialized {
            if !is_secret_type(&entry.keyring_type) {
                unencrypted.push(entry.clone());
                continue;
            }
            let empty_simple = entry.keyring_type == SIMPLE_KEYRING
                && entry.data.as_array().is_none_or(|keys| keys.is_empty());
            if !empty_simple {
                has_encrypted = true;
            }
        }

        let value = serde_json::to_value(&serialized)
            .map_err(|e| EncryptorError::Serialization(e.to_string()))?;
        let vault = self.encryptor.encrypt(password, &value)?;

        let next = KeyringState {
            vault: Some(vault),
            unencrypted_keyring_data: Some(unencrypted),
            has_encrypted_keyring_data: has_encrypted,
            ..inner.state.clone()
        };
        self.store.save(&next)?;
        inner.state = next;
        debug!(
            keyrings = serialized.len(),
            has_encrypted, "persisted keyrings"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lock / unlock
    // ------------------------------------------------------------------

    fn setup_boot(&self, inner: &mut Inner, password: &str) -> Result<()> {
        let booted = self
            .encryptor
            .encrypt(password, &Value::String(BOOTED_SENTINEL.to_string()))?;
        let next = KeyringState {
            booted: Some(booted),
            ..inner.state.clone()
        };
        self.store.save(&next)?;
        inner.state = next;
        inner.password = Some(Password::new(password));
        Ok(())
    }

    /// Set the first password: store the booted sentinel and unlock.
    /// The vault itself is left untouched.
    pub async fn boot(&self, password: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.setup_boot(&mut inner, password)?;
        self.mem.write().is_unlocked = true;
        info!("keyring service booted");
        Ok(())
    }

    fn verify(&self, inner: &Inner, password: &str) -> Result<()> {
        let booted = inner.state.booted.as_deref().ok_or(ServiceError::NoVault)?;
        self.encryptor.decrypt(password, booted)?;
        Ok(())
    }

    /// Check `password` against the booted sentinel.
    pub async fn verify_password(&self, password: &str) -> Result<()> {
        let inner = self.inner.lock().await;
        self.verify(&inner, password)
    }

    fn set_unlocked(&self, scene: UnlockScene) {
        self.mem.write().is_unlocked = true;
        self.emit(KeyringEvent::Unlocked { scene });
    }

    fn restore(&self, serialized: SerializedKeyring) -> Result<Box<dyn Keyring>> {
        let SerializedKeyring { keyring_type, data } = serialized;
        let keyring = self
            .registry
            .build(&keyring_type, data)
            .ok_or(ServiceError::UnknownKeyringType(keyring_type))??;
        Ok(keyring)
    }

    fn decrypt_vault(&self, state: &KeyringState, password: &str) -> Result<Vec<SerializedKeyring>> {
        let Some(vault) = state.vault.as_deref() else {
            return Ok(Vec::new());
        };
        let value = self.encryptor.decrypt(password, vault)?;
        serde_json::from_value(value)
            .map_err(|e| EncryptorError::CorruptedPayload(format!("vault: {e}")).into())
    }

    fn unlock_keyrings(&self, state: &KeyringState, password: &str) -> Result<Vec<Box<dyn Keyring>>> {
        self.decrypt_vault(state, password)?
            .into_iter()
            .map(|s| self.restore(s))
            .collect()
    }

    /// Unlock with `password`, rebuilding every keyring from the vault.
    ///
    /// A call made while another is in flight returns the current display
    /// state immediately. A vault that fails to decrypt or restore leaves
    /// the service unlocked with no keyrings and is never overwritten here.
    pub async fn submit_password(&self, password: &str) -> Result<MemStoreState> {
        if self.submitting.swap(true, Ordering::AcqRel) {
            return Ok(self.mem_state());
        }
        let _guard = SubmitGuard(&self.submitting);

        let mut inner = self.inner.lock().await;
        self.verify(&inner, password)?;
        inner.password = Some(Password::new(password));

        let restored = self.unlock_keyrings(&inner.state, password);
        let restore_failed = match restored {
            Ok(keyrings) => {
                inner.replace_keyrings(keyrings);
                false
            }
            Err(e) => {
                warn!("failed to restore keyrings from vault: {e}");
                inner.keyrings.clear();
                true
            }
        };
        self.update_mem_keyrings(&inner);
        self.set_unlocked(UnlockScene::Unlock);
        info!(keyrings = inner.keyrings.len(), "keyring service unlocked");

        if inner.state.unencrypted_keyring_data.is_none() && !restore_failed {
            self.persist_all(&mut inner)?;
        }
        drop(inner);
        Ok(self.full_update())
    }

    /// Drop the password and every keyring. Idempotent.
    pub async fn set_locked(&self) -> MemStoreState {
        let mut inner = self.inner.lock().await;
        inner.password = None;
        inner.keyrings.clear();
        {
            let mut mem = self.mem.write();
            mem.is_unlocked = false;
            mem.keyrings.clear();
        }
        drop(inner);
        self.emit(KeyringEvent::Locked);
        info!("keyring service locked");
        self.full_update()
    }

    /// Re-encrypt the sentinel and vault under `new_password`.
    pub async fn update_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.update_password_locked(&mut inner, old_password, new_password)
    }

    fn update_password_locked(&self, inner: &mut Inner, old_password: &str, new_password: &str) -> Result<()> {
        self.verify(inner, old_password)?;
        self.emit(KeyringEvent::BeforeUpdatePassword {
            keyring_state: inner.state.clone(),
        });

        let previous = (inner.password.clone(), inner.state.clone());
        self.setup_boot(inner, new_password)?;
        if let Err(e) = self.persist_all(inner) {
            // Keep sentinel and vault under the same password.
            let (password, state) = previous;
            if self.store.save(&state).is_ok() {
                inner.state = state;
                inner.password = password;
            }
            return Err(e);
        }
        info!("password updated");
        Ok(())
    }

    /// Set a new password when no account exists (forgotten password flow).
    pub async fn reset_password(&self, new_password: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if visible_count(&inner) > 0 {
            return Err(ServiceError::AccountsExist);
        }
        self.setup_boot(&mut inner, new_password)?;
        inner.keyrings.clear();
        if let Err(e) = self.persist_all(&mut inner) {
            warn!("persist after password reset failed: {e}");
        }
        self.mem.write().keyrings.clear();
        Ok(())
    }

    /// Wipe every keyring. With a new password the empty vault is
    /// re-encrypted under it; without one, vault and sentinel are dropped.
    pub async fn dangerously_reset_password_and_keyrings(
        &self,
        old_password: &str,
        new_password: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match new_password {
            Some(new_password) => {
                self.verify(&inner, old_password)?;
                inner.keyrings.clear();
                self.update_password_locked(&mut inner, old_password, new_password)?;
            }
            None => {
                self.verify(&inner, old_password)?;
                inner.keyrings.clear();
                self.persist_all(&mut inner)?;
                let next = KeyringState {
                    vault: None,
                    booted: None,
                    ..inner.state.clone()
                };
                self.store.save(&next)?;
                inner.state = next;
            }
        }
        self.update_mem_keyrings(&inner);
        warn!("keyrings wiped");
        Ok(())
    }

    /// Emit the current display state as [`KeyringEvent::Updated`].
    pub fn full_update(&self) -> MemStoreState {
        let snapshot = self.mem_state();
        self.emit(KeyringEvent::Updated(snapshot.clone()));
        snapshot
    }

    // ------------------------------------------------------------------
    // Display mirror
    // ------------------------------------------------------------------

    fn display_for_keyring(m: &ManagedKeyring) -> DisplayedKeyring {
        let accounts = m
            .keyring
            .get_accounts_with_brand()
            .into_iter()
            .map(|a| DisplayedAccount {
                address: normalize_address(&a.address),
                brand_name: a.brand_name,
            })
            .collect();
        DisplayedKeyring {
            id: m.id,
            keyring_type: m.keyring.keyring_type().to_string(),
            accounts,
            by_import: m.keyring.by_import(),
            public_key: m.keyring.public_key(),
        }
    }

    fn update_mem_keyrings(&self, inner: &Inner) {
        let keyrings = inner.keyrings.iter().map(Self::display_for_keyring).collect();
        self.mem.write().keyrings = keyrings;
    }

    // ------------------------------------------------------------------
    // Keyring list management
    // ------------------------------------------------------------------

    /// Registered keyring type names.
    pub fn get_keyring_types(&self) -> Vec<String> {
        self.registry.types()
    }

    pub async fn get_keyring_by_type(&self, keyring_type: &str) -> Option<KeyringId> {
        let inner = self.inner.lock().await;
        inner
            .keyrings
            .iter()
            .find(|m| m.keyring.keyring_type() == keyring_type)
            .map(|m| m.id)
    }

    pub async fn get_keyrings_by_type(&self, keyring_type: &str) -> Vec<KeyringId> {
        let inner = self.inner.lock().await;
        inner
            .keyrings
            .iter()
            .filter(|m| m.keyring.keyring_type() == keyring_type)
            .map(|m| m.id)
            .collect()
    }

    /// Addresses of one keyring.
    pub async fn keyring_accounts(&self, id: KeyringId) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.keyring(id)?.get_accounts())
    }

    /// Drop keyrings that no longer hold any account. Not persisted.
    pub async fn remove_empty_keyrings(&self) {
        let mut inner = self.inner.lock().await;
        inner.keyrings.retain(|m| !m.keyring.get_accounts().is_empty());
        self.update_mem_keyrings(&inner);
    }

    /// Drop every keyring from memory. Not persisted.
    pub async fn clear_keyrings(&self) {
        let mut inner = self.inner.lock().await;
        inner.keyrings.clear();
        self.mem.write().keyrings.clear();
    }

    /// Rebuild one keyring from serialized data and append it. Not persisted.
    pub async fn restore_keyring(&self, serialized: SerializedKeyring) -> Result<KeyringId> {
        let keyring = self.restore(serialized)?;
        let mut inner = self.inner.lock().await;
        let id = inner.push(keyring);
        self.update_mem_keyrings(&inner);
        Ok(id)
    }

    fn check_for_duplicate(inner: &Inner, keyring_type: &str, new_accounts: &[String]) -> Result<()> {
        let existing: Vec<String> = inner
            .keyrings
            .iter()
            .filter(|m| m.keyring.keyring_type() == keyring_type)
            .flat_map(|m| m.keyring.get_accounts())
            .map(|a| normalize_address(&a))
            .collect();
        let duplicate = new_accounts.iter().find(|account| {
            let lower = account.to_lowercase();
            existing
                .iter()
                .any(|key| *key == lower || key == strip_hex_prefix(account))
        });
        match duplicate {
            Some(account) => Err(ServiceError::DuplicateAccount(account.clone())),
            None => Ok(()),
        }
    }

    fn next_hd_index(inner: &Inner) -> u32 {
        let hd: Vec<&ManagedKeyring> = inner
            .keyrings
            .iter()
            .filter(|m| m.keyring.keyring_type() == HD_KEYRING)
            .collect();
        let max_index = hd
            .iter()
            .filter_map(|m| m.keyring.hd_index())
            .map(i64::from)
            .max()
            .unwrap_or(-1);
        let floor = hd.len() as i64 - 1;
        u32::try_from(max_index.max(floor) + 1).unwrap_or(0)
    }

    /// Give a not-yet-added HD keyring the next free HD ordinal.
    pub async fn update_hd_keyring_index(&self, keyring: &mut dyn Keyring) {
        if keyring.keyring_type() != HD_KEYRING {
            return;
        }
        let inner = self.inner.lock().await;
        keyring.set_hd_index(Self::next_hd_index(&inner));
    }

    fn add_keyring_locked(&self, inner: &mut Inner, mut keyring: Box<dyn Keyring>) -> Result<KeyringId> {
        inner.password()?;
        let keyring_type = keyring.keyring_type().to_string();
        Self::check_for_duplicate(inner, &keyring_type, &keyring.get_accounts())?;
        if keyring_type == HD_KEYRING {
            keyring.set_hd_index(Self::next_hd_index(inner));
        }
        let id = inner.push(keyring);
        if let Err(e) = self.persist_all(inner) {
            inner.keyrings.pop();
            return Err(e);
        }
        self.update_mem_keyrings(inner);
        debug!(%id, %keyring_type, "added keyring");
        Ok(id)
    }

    /// Add a caller-built keyring after the duplicate check.
    pub async fn add_keyring(&self, keyring: Box<dyn Keyring>) -> Result<KeyringId> {
        let mut inner = self.inner.lock().await;
        let id = self.add_keyring_locked(&mut inner, keyring)?;
        drop(inner);
        self.full_update();
        Ok(id)
    }

    /// Construct a keyring of a registered type from `opts` and add it.
    pub async fn add_new_keyring(&self, keyring_type: &str, opts: Value) -> Result<KeyringId> {
        let keyring = self.restore(SerializedKeyring::new(keyring_type, opts))?;
        self.add_keyring(keyring).await
    }

    async fn announce_accounts(&self, keyring_type: &str, accounts: &[Account]) {
        for account in accounts {
            self.emit(KeyringEvent::NewAccount(account.clone()));
            if let Some(hook) = &self.alias_hook {
                hook.on_new_account(keyring_type, account).await;
            }
        }
    }

    fn branded(keyring: &dyn Keyring, addresses: &[String]) -> Vec<Account> {
        let brands = keyring.get_accounts_with_brand();
        addresses
            .iter()
            .map(|address| {
                let brand = brands
                    .iter()
                    .find(|b| is_same_address(&b.address, address))
                    .map(|b| b.real_brand_name.clone().unwrap_or_else(|| b.brand_name.clone()))
                    .unwrap_or_else(|| keyring.keyring_type().to_string());
                Account::new(normalize_address(address), keyring.keyring_type(), brand)
            })
            .collect()
    }

    /// Derive or add one more account on keyring `id`.
    pub async fn add_new_account(&self, id: KeyringId) -> Result<Vec<Account>> {
        let mut inner = self.inner.lock().await;
        inner.password()?;
        let idx = inner.position(id)?;
        let keyring = &mut inner.keyrings[idx].keyring;
        let snapshot = keyring.serialize()?;
        let added = keyring.add_accounts(1).await?;
        let keyring_type = keyring.keyring_type().to_string();
        let accounts = Self::branded(keyring.as_ref(), &added);

        if let Err(e) = self.persist_all(&mut inner) {
            if let Err(rollback) = inner.keyrings[idx].keyring.deserialize(snapshot) {
                warn!("failed to roll back keyring {id}: {rollback}");
            }
            return Err(e);
        }
        self.update_mem_keyrings(&inner);
        self.announce_accounts(&keyring_type, &accounts).await;
        drop(inner);
        self.full_update();
        Ok(accounts)
    }

    fn find_keyring_for_account(
        inner: &Inner,
        address: &str,
        keyring_type: Option<&str>,
        include_watch: bool,
    ) -> Result<usize> {
        let wanted = normalize_address(address);
        debug!(address = %wanted, "looking up keyring for account");
        inner
            .keyrings
            .iter()
            .position(|m| {
                let ty = m.keyring.keyring_type();
                keyring_type.is_none_or(|t| t == ty)
                    && (include_watch || ty != WATCH_KEYRING)
                    && m.keyring
                        .get_accounts()
                        .iter()
                        .any(|a| normalize_address(a) == wanted)
            })
            .ok_or(ServiceError::NoKeyringForAccount)
    }

    /// First keyring holding `address`.
    pub async fn get_keyring_for_account(
        &self,
        address: &str,
        keyring_type: Option<&str>,
        include_watch_keyring: bool,
    ) -> Result<KeyringId> {
        let inner = self.inner.lock().await;
        let idx = Self::find_keyring_for_account(&inner, address, keyring_type, include_watch_keyring)?;
        Ok(inner.keyrings[idx].id)
    }

    /// Remove one account; drop its keyring if that left it empty.
    pub async fn remove_account(
        &self,
        address: &str,
        keyring_type: &str,
        brand: Option<&str>,
        remove_empty_keyrings: bool,
    ) -> Result<MemStoreState> {
        let mut inner = self.inner.lock().await;
        inner.password()?;
        let idx = Self::find_keyring_for_account(&inner, address, Some(keyring_type), true)?;
        let keyring = &mut inner.keyrings[idx].keyring;
        if !keyring.supports(Capability::RemoveAccount) {
            return Err(KeyringError::unsupported(keyring.keyring_type(), "account removal operations").into());
        }
        let snapshot = keyring.serialize()?;
        keyring.remove_account(address, brand)?;

        let dropped = if keyring.get_accounts().is_empty() && remove_empty_keyrings {
            Some(inner.keyrings.remove(idx))
        } else {
            None
        };

        if let Err(e) = self.persist_all(&mut inner) {
            if let Some(managed) = dropped {
                inner.keyrings.insert(idx, managed);
            }
            let restored = &mut inner.keyrings[idx];
            if let Err(rollback) = restored.keyring.deserialize(snapshot) {
                warn!("failed to roll back keyring {}: {rollback}", restored.id);
            }
            return Err(e);
        }

        self.update_mem_keyrings(&inner);
        self.emit(KeyringEvent::RemovedAccount(Account::new(
            address,
            keyring_type,
            brand.unwrap_or_default(),
        )));
        if let Some(mut managed) = dropped {
            if managed.keyring.supports(Capability::ForgetDevice) {
                if let Err(e) = managed.keyring.forget_device().await {
                    warn!("forget device failed: {e}");
                }
            }
            debug!(id = %managed.id, "dropped empty keyring");
        }
        drop(inner);
        Ok(self.full_update())
    }

    /// Drop every keyring whose public key equals `public_key`.
    pub async fn remove_keyring_by_public_key(&self, public_key: &str) -> Result<MemStoreState> {
        let mut inner = self.inner.lock().await;
        inner.password()?;
        inner
            .keyrings
            .retain(|m| m.keyring.public_key().as_deref() != Some(public_key));
        self.persist_all(&mut inner)?;
        self.update_mem_keyrings(&inner);
        drop(inner);
        Ok(self.full_update())
    }

    // ------------------------------------------------------------------
    // Import and mnemonics
    // ------------------------------------------------------------------

    /// Import a raw private key as a new `Simple Key Pair` keyring.
    pub async fn import_private_key(&self, private_key: &str) -> Result<KeyringId> {
        let keyring = self.restore(SerializedKeyring::new(SIMPLE_KEYRING, json!([private_key])))?;
        let mut inner = self.inner.lock().await;
        let id = self.add_keyring_locked(&mut inner, keyring)?;
        let keyring = inner.keyring(id)?;
        let accounts = Self::branded(keyring, &keyring.get_accounts());
        if let (Some(hook), Some(account)) = (&self.alias_hook, accounts.first()) {
            hook.on_new_account(SIMPLE_KEYRING, account).await;
        }
        drop(inner);
        self.set_unlocked(UnlockScene::ImportPrivateKey);
        self.full_update();
        info!(%id, "imported private key");
        Ok(id)
    }

    /// Create an HD keyring from `phrase` holding its first account.
    pub async fn create_keyring_with_mnemonics(&self, phrase: &str) -> Result<KeyringId> {
        if !mnemonic::validate_mnemonic(phrase) {
            return Err(ServiceError::InvalidMnemonic);
        }
        let keyring = self.restore(SerializedKeyring::new(
            HD_KEYRING,
            json!({ "mnemonic": mnemonic::normalize_phrase(phrase), "activeIndexes": [0] }),
        ))?;
        let mut inner = self.inner.lock().await;
        let id = self.add_keyring_locked(&mut inner, keyring)?;
        let keyring = inner.keyring(id)?;
        let accounts = Self::branded(keyring, &keyring.get_accounts());
        self.announce_accounts(HD_KEYRING, &accounts).await;
        drop(inner);
        self.set_unlocked(UnlockScene::CreateKeyringWithMnemonics);
        self.full_update();
        info!(%id, "created mnemonic keyring");
        Ok(id)
    }

    /// Fresh 12-word mnemonic. Not stored anywhere.
    pub fn generate_mnemonic(&self) -> String {
        mnemonic::generate_mnemonic()
    }

    /// Generate a mnemonic and park it, encrypted, until the user has
    /// backed it up.
    pub async fn generate_pre_mnemonic(&self) -> Result<String> {
        let inner = self.inner.lock().await;
        let password = inner.password()?;
        let phrase = mnemonic::generate_mnemonic();
        let sealed = self
            .encryptor
            .encrypt(password, &Value::String(phrase.clone()))?;
        self.mem.write().pre_mnemonics = sealed;
        Ok(phrase)
    }

    /// The parked mnemonic, if any.
    pub async fn get_pre_mnemonics(&self) -> Result<Option<String>> {
        let sealed = self.mem.read().pre_mnemonics.clone();
        if sealed.is_empty() {
            return Ok(None);
        }
        let inner = self.inner.lock().await;
        let value = self.encryptor.decrypt(inner.password()?, &sealed)?;
        Ok(value.as_str().map(str::to_string))
    }

    pub fn remove_pre_mnemonics(&self) {
        self.mem.write().pre_mnemonics.clear();
    }

    /// Reveal the private key of `address`.
    pub async fn export_account(&self, address: &str) -> Result<String> {
        let inner = self.inner.lock().await;
        let idx = Self::find_keyring_for_account(&inner, address, None, true)?;
        let secret = inner.keyrings[idx]
            .keyring
            .export_account(&normalize_address(address))
            .await?;
        Ok(secret)
    }

    // ------------------------------------------------------------------
    // Signing
    // ------------------------------------------------------------------

    pub async fn sign_transaction(&self, from: &str, tx: &Value, opts: &Value) -> Result<String> {
        let inner = self.inner.lock().await;
        let idx = Self::find_keyring_for_account(&inner, from, None, true)?;
        let sig = inner.keyrings[idx]
            .keyring
            .sign_transaction(&normalize_address(from), tx, opts)
            .await?;
        Ok(sig)
    }

    pub async fn sign_message(&self, from: &str, data: &str, opts: &Value) -> Result<String> {
        let inner = self.inner.lock().await;
        let idx = Self::find_keyring_for_account(&inner, from, None, true)?;
        let sig = inner.keyrings[idx]
            .keyring
            .sign_message(&normalize_address(from), data, opts)
            .await?;
        Ok(sig)
    }

    pub async fn sign_personal_message(&self, from: &str, data: &str, opts: &Value) -> Result<String> {
        let inner = self.inner.lock().await;
        let idx = Self::find_keyring_for_account(&inner, from, None, true)?;
        let sig = inner.keyrings[idx]
            .keyring
            .sign_personal_message(&normalize_address(from), data, opts)
            .await?;
        Ok(sig)
    }

    /// Sign typed data. `opts.version` defaults to `V1`.
    pub async fn sign_typed_message(&self, from: &str, data: &Value, opts: &Value) -> Result<String> {
        let opts = if opts.get("version").is_some() {
            opts.clone()
        } else {
            let mut with_version = opts.as_object().cloned().unwrap_or_default();
            with_version.insert("version".into(), Value::String("V1".into()));
            Value::Object(with_version)
        };
        let inner = self.inner.lock().await;
        let idx = Self::find_keyring_for_account(&inner, from, None, true)?;
        let sig = inner.keyrings[idx]
            .keyring
            .sign_typed_data(&normalize_address(from), data, &opts)
            .await?;
        Ok(sig)
    }

    pub async fn sign_eip7702_authorization(
        &self,
        from: &str,
        authorization: &Eip7702Authorization,
        opts: &Value,
    ) -> Result<String> {
        let inner = self.inner.lock().await;
        let idx = Self::find_keyring_for_account(&inner, from, None, true)?;
        let keyring = &inner.keyrings[idx].keyring;
        if !keyring.supports(Capability::SignEip7702Authorization) {
            return Err(KeyringError::unsupported(
                keyring.keyring_type(),
                "signEip7702Authorization operation",
            )
            .into());
        }
        let sig = keyring
            .sign_eip7702_authorization(&normalize_address(from), authorization, opts)
            .await?;
        Ok(sig)
    }

    // ------------------------------------------------------------------
    // Account queries
    // ------------------------------------------------------------------

    /// Every address of every live keyring, normalized.
    pub async fn get_accounts(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .keyrings
            .iter()
            .flat_map(|m| m.keyring.get_accounts())
            .map(|a| normalize_address(&a))
            .collect()
    }

    pub async fn get_all_typed_accounts(&self) -> Vec<DisplayedKeyring> {
        let inner = self.inner.lock().await;
        inner.keyrings.iter().map(Self::display_for_keyring).collect()
    }

    /// Displayed keyrings that hold at least one account.
    pub async fn get_all_typed_visible_accounts(&self) -> Vec<DisplayedKeyring> {
        let inner = self.inner.lock().await;
        visible_keyrings(&inner)
    }

    pub async fn get_all_visible_accounts_array(&self) -> Vec<KeyringAccount> {
        let inner = self.inner.lock().await;
        flatten(visible_keyrings(&inner))
    }

    pub async fn get_all_addresses(&self) -> Vec<KeyringAccount> {
        let inner = self.inner.lock().await;
        flatten(inner.keyrings.iter().map(Self::display_for_keyring).collect())
    }

    pub async fn has_address(&self, address: &str) -> bool {
        self.get_all_addresses()
            .await
            .iter()
            .any(|a| is_same_address(&a.address, address))
    }

    pub async fn get_count_of_accounts_in_keyring(&self) -> usize {
        let inner = self.inner.lock().await;
        visible_count(&inner)
    }

    // ------------------------------------------------------------------
    // Extension sync
    // ------------------------------------------------------------------

    /// Merge a vault exported by another wallet into this one and return
    /// the accounts it introduced.
    pub async fn sync_extension_data(&self, vault: Vec<SerializedKeyring>) -> Result<Vec<Account>> {
        let mut inner = self.inner.lock().await;
        let password = inner.password()?.to_string();

        let incoming: Vec<SerializedKeyring> = vault
            .into_iter()
            .map(|mut entry| {
                if entry.keyring_type == HD_KEYRING {
                    let details: Option<Vec<Value>> = entry
                        .data
                        .get("accountDetails")
                        .and_then(Value::as_object)
                        .map(|d| d.keys().cloned().map(Value::String).collect());
                    if let (Some(accounts), Some(obj)) = (details, entry.data.as_object_mut()) {
                        obj.insert("accounts".into(), Value::Array(accounts));
                    }
                }
                entry
            })
            .collect();

        let existing = flatten(visible_keyrings(&inner));
        let mut added = Vec::new();
        for entry in &incoming {
            let keyring = self.restore(entry.clone())?;
            let ty = keyring.keyring_type();
            for account in keyring.get_accounts_with_brand() {
                let exists = existing.iter().any(|e| {
                    is_same_address(&e.address, &account.address) && e.keyring_type == ty
                });
                let pending = added.iter().any(|a: &Account| {
                    is_same_address(&a.address, &account.address) && a.keyring_type == ty
                });
                if !exists && !pending {
                    added.push(Account::new(normalize_address(&account.address), ty, account.brand_name));
                }
            }
        }

        let old = self.decrypt_vault(&inner.state, &password)?;
        let merged = merge_vault(&old, &incoming);
        let restored = merged
            .into_iter()
            .map(|s| self.restore(s))
            .collect::<Result<Vec<_>>>()?;
        let keyrings = drop_repeated_secrets(restored);
        inner.replace_keyrings(keyrings);
        self.persist_all(&mut inner)?;
        self.update_mem_keyrings(&inner);
        info!(
            incoming = incoming.len(),
            keyrings = inner.keyrings.len(),
            added = added.len(),
            "synced extension vault"
        );
        Ok(added)
    }

    // ------------------------------------------------------------------
    // Password helpers
    // ------------------------------------------------------------------

    /// Encrypt arbitrary content under the current password.
    pub async fn encrypt_with_password(&self, content: &Value) -> Result<String> {
        let inner = self.inner.lock().await;
        Ok(password::password_encrypt(content, inner.password()?, &self.kdf)?)
    }

    /// Decrypt content produced by [`encrypt_with_password`](Self::encrypt_with_password).
    pub async fn decrypt_with_password(&self, encrypted: &str) -> Result<Value> {
        let inner = self.inner.lock().await;
        Ok(password::password_decrypt(encrypted, inner.password()?, &self.kdf)?)
    }
}

/// Drop secret keyrings whose accounts an earlier keyring of the same
/// type already holds, so one key never lives in two keyrings.
fn drop_repeated_secrets(keyrings: Vec<Box<dyn Keyring>>) -> Vec<Box<dyn Keyring>> {
    let mut held: Vec<(String, String)> = Vec::new();
    let mut kept = Vec::with_capacity(keyrings.len());
    for keyring in keyrings {
        let ty = keyring.keyring_type().to_string();
        let accounts: Vec<String> = keyring.get_accounts().iter().map(|a| normalize_address(a)).collect();
        if is_secret_type(&ty)
            && !accounts.is_empty()
            && accounts.iter().all(|a| held.iter().any(|(t, h)| *t == ty && h == a))
        {
            debug!(keyring_type = %ty, "skipping keyring that repeats held accounts");
            continue;
        }
        held.extend(accounts.into_iter().map(|a| (ty.clone(), a)));
        kept.push(keyring);
    }
    kept
}

fn visible_keyrings(inner: &Inner) -> Vec<DisplayedKeyring> {
    inner
        .keyrings
        .iter()
        .map(KeyringService::display_for_keyring)
        .filter(|k| !k.accounts.is_empty())
        .collect()
}

fn visible_count(inner: &Inner) -> usize {
    visible_keyrings(inner).iter().map(|k| k.accounts.len()).sum()
}

fn flatten(keyrings: Vec<DisplayedKeyring>) -> Vec<KeyringAccount> {
    keyrings
        .into_iter()
        .flat_map(|k| {
            let DisplayedKeyring {
                keyring_type,
                accounts,
                by_import,
                ..
            } = k;
            accounts.into_iter().map(move |a| KeyringAccount {
                address: a.address,
                brand_name: a.brand_name,
                keyring_type: keyring_type.clone(),
                by_import,
            })
        })
        .collect()
}
