//! [`KeyringStore`] implementations: in-memory and JSON state file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use lockbox_core::error::StoreError;
use lockbox_core::traits::KeyringStore;
use lockbox_core::types::KeyringState;

/// Volatile store, used by tests and by embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Option<KeyringState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `state`.
    pub fn with_state(state: KeyringState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
        }
    }

    /// Copy of the last saved state.
    pub fn snapshot(&self) -> Option<KeyringState> {
        self.state.lock().clone()
    }
}

impl KeyringStore for MemoryStore {
    fn load(&self) -> Result<Option<KeyringState>, StoreError> {
        Ok(self.state.lock().clone())
    }

    fn save(&self, state: &KeyringState) -> Result<(), StoreError> {
        *self.state.lock() = Some(state.clone());
        Ok(())
    }
}

/// Keyring state persisted as one pretty-printed JSON file.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so a crash never leaves a half-written state file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl KeyringStore for JsonFileStore {
    fn load(&self) -> Result<Option<KeyringState>, StoreError> {
        let _guard = self.lock.lock();
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(format!("{}: {e}", self.path.display()))),
        };
        let state = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Corrupted(format!("{}: {e}", self.path.display())))?;
        Ok(Some(state))
    }

    fn save(&self, state: &KeyringState) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let json =
            serde_json::to_vec_pretty(state).map_err(|e| StoreError::Serialization(e.to_string()))?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let tmp = self.tmp_path();
        let mut file = fs::File::create(&tmp).map_err(|e| StoreError::Io(e.to_string()))?;
        file.write_all(&json)
            .and_then(|()| file.sync_all())
            .map_err(|e| StoreError::Io(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::Io(e.to_string()))?;
        debug!(path = %self.path.display(), bytes = json.len(), "saved keyring state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockbox_core::types::SerializedKeyring;
    use serde_json::json;

    fn sample_state() -> KeyringState {
        KeyringState {
            booted: Some("b".into()),
            vault: Some("v".into()),
            unencrypted_keyring_data: Some(vec![SerializedKeyring::new(
                "Watch Address",
                json!({ "accounts": ["0x01"] }),
            )]),
            has_encrypted_keyring_data: true,
        }
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.load().unwrap().is_none());
        store.save(&sample_state()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample_state()));
    }

    #[test]
    fn file_store_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn file_store_roundtrip_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("state.json"));
        store.save(&sample_state()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample_state()));
        assert!(!store.tmp_path().exists());
    }

    #[test]
    fn file_store_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        store.save(&sample_state()).unwrap();
        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("unencryptedKeyringData"));
        assert!(raw.contains("hasEncryptedKeyringData"));
    }

    #[test]
    fn file_store_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{not json").unwrap();
        let err = JsonFileStore::new(path).load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupted(_)));
    }
}
