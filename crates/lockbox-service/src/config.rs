//! Service configuration.
//!
//! [`ServiceConfig::default`] works out of the box. [`ServiceConfig::load`]
//! layers an optional TOML file and `LOCKBOX__*` environment variables on
//! top of the defaults, e.g. `LOCKBOX__KDF__M_COST=131072`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cipher::KdfParams;

/// Default state file name inside the data directory.
pub const DEFAULT_STATE_FILE: &str = "keyring-state.json";

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Argon2id cost section of the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfConfig {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        let p = KdfParams::default();
        Self {
            m_cost: p.m_cost,
            t_cost: p.t_cost,
            p_cost: p.p_cost,
        }
    }
}

impl From<KdfConfig> for KdfParams {
    fn from(c: KdfConfig) -> Self {
        Self {
            m_cost: c.m_cost,
            t_cost: c.t_cost,
            p_cost: c.p_cost,
        }
    }
}

/// Configuration for a keyring service instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Root directory for persistent data.
    pub data_dir: PathBuf,
    /// File name of the JSON keyring state inside `data_dir`.
    pub state_file: String,
    /// Password stretching cost.
    pub kdf: KdfConfig,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Log level filter string (e.g. "info", "lockbox_service=debug").
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lockbox");

        Self {
            data_dir,
            state_file: DEFAULT_STATE_FILE.to_string(),
            kdf: KdfConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            log_level: "info".to_string(),
        }
    }
}

impl ServiceConfig {
    /// Load defaults, then `file` (if it exists), then `LOCKBOX__*` env vars.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder
            .add_source(config::Environment::with_prefix("LOCKBOX").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Full path of the keyring state file.
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(&self.state_file)
    }

    pub fn kdf_params(&self) -> KdfParams {
        self.kdf.into()
    }
}
