//! Keyring type registry: maps persisted type names to constructors.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use lockbox_core::constants::{
    GNOSIS_KEYRING, HARDWARE_KEYRING_TYPES, HD_KEYRING, SIMPLE_KEYRING, WATCH_KEYRING,
};
use lockbox_core::error::KeyringError;
use lockbox_core::traits::Keyring;

use crate::{GnosisKeyring, HardwareKeyring, HdKeyring, SimpleKeyring, WatchKeyring};

/// Constructor for an empty keyring of one type.
pub type KeyringFactory = Arc<dyn Fn() -> Box<dyn Keyring> + Send + Sync>;

#[derive(Clone, Default)]
pub struct KeyringRegistry {
    factories: BTreeMap<String, KeyringFactory>,
}

impl fmt::Debug for KeyringRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

impl KeyringRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every reference keyring type.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register(SIMPLE_KEYRING, || Box::new(SimpleKeyring::new()));
        reg.register(HD_KEYRING, || Box::new(HdKeyring::new()));
        reg.register(WATCH_KEYRING, || Box::new(WatchKeyring::new()));
        reg.register(GNOSIS_KEYRING, || Box::new(GnosisKeyring::new()));
        for ty in HARDWARE_KEYRING_TYPES {
            reg.register(ty, move || Box::new(HardwareKeyring::new(ty)));
        }
        reg
    }

    /// Register (or replace) the constructor for `keyring_type`.
    pub fn register<F>(&mut self, keyring_type: &str, factory: F)
    where
        F: Fn() -> Box<dyn Keyring> + Send + Sync + 'static,
    {
        self.factories
            .insert(keyring_type.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, keyring_type: &str) -> bool {
        self.factories.contains_key(keyring_type)
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Empty keyring of `keyring_type`, or `None` if the type is unknown.
    pub fn create(&self, keyring_type: &str) -> Option<Box<dyn Keyring>> {
        self.factories.get(keyring_type).map(|f| f())
    }

    /// Keyring of `keyring_type` initialized from `data`.
    pub fn build(
        &self,
        keyring_type: &str,
        data: Value,
    ) -> Option<Result<Box<dyn Keyring>, KeyringError>> {
        let mut keyring = self.create(keyring_type)?;
        Some(keyring.deserialize(data).map(|()| keyring))
    }
}
