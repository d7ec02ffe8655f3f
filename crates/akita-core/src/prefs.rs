//! Bridge preferences: the host's key/value store and the bridge config
//! kept in it.
//!
//! The host exposes preferences as string values keyed by name. The bridge
//! keeps a single JSON document under [`PREFS_KEY`]:
//!
//! ```json
//! {"enabled":true,"gatewayAddress":"10.0.0.2","gatewayPort":8080,"pollIntervalMs":1000}
//! ```
//!
//! Missing fields fall back to defaults; a document that does not parse is
//! ignored as a whole.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Preference key holding the bridge config document.
pub const PREFS_KEY: &str = "akita-ipfs";

/// The host's preference store.
pub trait Prefs {
    /// Value stored under `key`, or `default` when absent.
    fn get(&self, key: &str, default: &str) -> String;

    /// Store `value` under `key`.
    fn set(&mut self, key: &str, value: String) -> Result<(), PrefsError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(String),
}

// ── Bridge config ────────────────────────────────────────────────────────────

/// Bridge state held for the life of the relay.
///
/// Populated at startup from [`Prefs`]. Changed only through explicit
/// configuration calls, never by the relay path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    pub enabled: bool,
    /// Gateway host name or IP address. Empty = not configured.
    pub gateway_address: String,
    pub gateway_port: u16,
    /// Interval between gateway reply polls.
    pub poll_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gateway_address: String::new(),
            gateway_port: 8080,
            poll_interval_ms: 1000,
        }
    }
}

impl BridgeConfig {
    /// Load from the preference store. Never fails: an unreadable document
    /// yields defaults.
    pub fn load(prefs: &dyn Prefs) -> Self {
        let doc = prefs.get(PREFS_KEY, "{}");
        serde_json::from_str(&doc).unwrap_or_else(|e| {
            tracing::warn!(error = %e, key = PREFS_KEY, "ignoring unreadable bridge prefs");
            Self::default()
        })
    }

    /// Persist to the preference store.
    pub fn save(&self, prefs: &mut dyn Prefs) -> Result<(), PrefsError> {
        let doc =
            serde_json::to_string(self).map_err(|e| PrefsError::SerializeFailed(e.to_string()))?;
        prefs.set(PREFS_KEY, doc)
    }

    pub fn has_gateway(&self) -> bool {
        !self.gateway_address.trim().is_empty()
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero interval would make tokio's interval panic.
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

// ── In-memory prefs ──────────────────────────────────────────────────────────

/// Preferences held in memory only. Used in tests and as the fallback when
/// no prefs file can be opened.
#[derive(Debug, Clone, Default)]
pub struct MemoryPrefs {
    values: BTreeMap<String, String>,
}

impl MemoryPrefs {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Prefs for MemoryPrefs {
    fn get(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), PrefsError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

// ── File-backed prefs ────────────────────────────────────────────────────────

/// Preferences persisted as a flat TOML table of strings. Written to disk on
/// every `set` so changes survive a restart.
#[derive(Debug)]
pub struct FilePrefs {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FilePrefs {
    /// Open the prefs file, starting empty if it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PrefsError> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| PrefsError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| PrefsError::ParseFailed(path.clone(), e))?
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), PrefsError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PrefsError::WriteFailed(self.path.clone(), e))?;
        }
        let text = toml::to_string_pretty(&self.values)
            .map_err(|e| PrefsError::SerializeFailed(e.to_string()))?;
        std::fs::write(&self.path, text).map_err(|e| PrefsError::WriteFailed(self.path.clone(), e))
    }
}

impl Prefs for FilePrefs {
    fn get(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), PrefsError> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }
}
