//! Configuration system for the Akita daemon.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $AKITA_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/akita/config.toml
//!   3. ~/.config/akita/config.toml
//!
//! This covers how the daemon runs. What the bridge relays (enabled flag,
//! gateway address) lives in the host prefs, see [`crate::prefs`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AkitaConfig {
    /// Seconds between "bridge active" status lines.
    pub status_interval_secs: u64,
    pub mesh: MeshConfig,
    pub gateway: GatewayTuning,
    pub storage: StorageConfig,
    pub prefs: PrefsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Local UDP address the mesh link binds to.
    pub bind_addr: String,
    /// UDP address of the radio host that outbound frames are sent to.
    pub radio_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayTuning {
    /// Upper bound on a single connect attempt.
    pub connect_timeout_ms: u64,
    /// Upper bound on waiting for reply lines after a request. 0 = don't wait.
    pub read_timeout_ms: u64,
    /// Connect attempts per send. Retries stall the relay, keep this small.
    pub connect_attempts: u32,
    /// Delay before the first retry, doubled for each one after.
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Relay to a remote gateway.
    Gateway,
    /// Serve content from an embedded in-memory store.
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub mode: StorageMode,
    /// Capacity of the embedded store in bytes.
    pub local_capacity_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefsConfig {
    /// Host preference file holding the bridge config.
    pub path: PathBuf,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for AkitaConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: 5,
            mesh: MeshConfig::default(),
            gateway: GatewayTuning::default(),
            storage: StorageConfig::default(),
            prefs: PrefsConfig::default(),
        }
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4403".into(),
            radio_addr: "127.0.0.1:4404".into(),
        }
    }
}

impl Default for GatewayTuning {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 2000,
            read_timeout_ms: 2000,
            connect_attempts: 1,
            backoff_ms: 500,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mode: StorageMode::Gateway,
            local_capacity_bytes: 1024 * 1024,
        }
    }
}

impl Default for PrefsConfig {
    fn default() -> Self {
        Self {
            path: data_dir().join("prefs.toml"),
        }
    }
}

impl GatewayTuning {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("akita")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("akita")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl AkitaConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            AkitaConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("AKITA_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&AkitaConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply AKITA_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("AKITA_MESH__BIND_ADDR") {
            self.mesh.bind_addr = v;
        }
        if let Some(v) = var("AKITA_MESH__RADIO_ADDR") {
            self.mesh.radio_addr = v;
        }
        if let Some(v) = var("AKITA_STORAGE__MODE") {
            match v.as_str() {
                "gateway" => self.storage.mode = StorageMode::Gateway,
                "local" => self.storage.mode = StorageMode::Local,
                other => tracing::warn!(value = other, "unknown AKITA_STORAGE__MODE, ignoring"),
            }
        }
        if let Some(v) = var("AKITA_GATEWAY__CONNECT_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.gateway.connect_timeout_ms = ms;
            }
        }
        if let Some(v) = var("AKITA_GATEWAY__READ_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.gateway.read_timeout_ms = ms;
            }
        }
    }
}
