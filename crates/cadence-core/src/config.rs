//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/cadence/config.toml)
//! 3. Environment variables (CADENCE_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Environment variable prefix
const ENV_PREFIX: &str = "CADENCE";

/// Default quiet period before an edit is flushed
pub const DEFAULT_DEBOUNCE_MS: u64 = 2000;

/// Default number of automatic retries after a failed remote write
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff base; retry `n` waits `base^n` seconds
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 2;

/// Default remote table holding planning documents
pub const DEFAULT_REMOTE_TABLE: &str = "planning_documents";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (local snapshots, SQLite backend)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Owner identity used to key snapshots, created on first use
    #[serde(default)]
    pub owner_id: Option<Uuid>,

    /// Remote backend URL
    ///
    /// `http://` / `https://` selects the hosted REST backend,
    /// `sqlite://<path>` a SQLite database. When unset, a SQLite
    /// database in the data directory is used.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// API key / bearer token for the hosted backend
    #[serde(default)]
    pub remote_api_key: Option<String>,

    /// Table holding planning documents on the remote backend
    #[serde(default = "default_remote_table")]
    pub remote_table: String,

    /// Debounce window in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Automatic retries after a failed remote write
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Exponential backoff base in seconds
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Log file path (logs go to stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            owner_id: None,
            remote_url: None,
            remote_api_key: None,
            remote_table: default_remote_table(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (CADENCE_DATA_DIR, CADENCE_REMOTE_URL, ...)
    /// 2. Config file (~/.config/cadence/config.toml or CADENCE_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring an explicit path from the CLI
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_OWNER_ID", ENV_PREFIX)) {
            if let Ok(id) = Uuid::parse_str(val.trim()) {
                self.owner_id = Some(id);
            }
        }

        // Empty string clears it
        if let Ok(val) = std::env::var(format!("{}_REMOTE_URL", ENV_PREFIX)) {
            self.remote_url = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_REMOTE_API_KEY", ENV_PREFIX)) {
            self.remote_api_key = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_DEBOUNCE_MS", ENV_PREFIX)) {
            if let Ok(ms) = val.parse() {
                self.debounce_ms = ms;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_MAX_RETRIES", ENV_PREFIX)) {
            if let Ok(n) = val.parse() {
                self.max_retries = n;
            }
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Write one key's current value to the config file
    ///
    /// Other keys keep their on-disk values, so environment overrides merged
    /// into `self` stay out of the file. A key whose value is unset is
    /// removed.
    pub fn save_key(&self, config_path: &Path, key: &str) -> Result<()> {
        let mut serialized = toml::Value::try_from(self).context("Failed to serialize config")?;
        let value = serialized.as_table_mut().and_then(|t| t.remove(key));
        update_file(config_path, key, value)
    }

    /// Get the config file path
    ///
    /// Can be overridden with CADENCE_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cadence")
            .join("config.toml")
    }

    /// Directory holding per-owner local snapshots
    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_dir.join("snapshots")
    }

    /// Path of the default SQLite backend
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("cadence.db")
    }

    /// Debounce window as a duration
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Return the owner identity, creating and persisting one on first use
    ///
    /// Only `owner_id` is written; the rest of the file is left as it is on
    /// disk, so values that came from the environment are not persisted.
    pub fn ensure_owner_id(&mut self, config_path: &Path) -> Result<Uuid> {
        if let Some(id) = self.owner_id {
            return Ok(id);
        }

        let id = Uuid::new_v4();
        update_file(
            config_path,
            "owner_id",
            Some(toml::Value::String(id.to_string())),
        )
        .context("Failed to persist new owner identity")?;
        self.owner_id = Some(id);
        tracing::info!("Created owner identity {}", id);
        Ok(id)
    }
}

/// Set or remove a single key in the config file
fn update_file(config_path: &Path, key: &str, value: Option<toml::Value>) -> Result<()> {
    let mut table = if config_path.exists() {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
        content
            .parse::<toml::Table>()
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?
    } else {
        toml::Table::new()
    };
    match value {
        Some(value) => table.insert(key.to_string(), value),
        None => table.remove(key),
    };

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }
    let content = toml::to_string_pretty(&table).context("Failed to serialize config")?;
    std::fs::write(config_path, content)
        .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
    Ok(())
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cadence")
}

fn default_remote_table() -> String {
    DEFAULT_REMOTE_TABLE.to_string()
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_backoff_base_secs() -> u64 {
    DEFAULT_BACKOFF_BASE_SECS
}
