//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILINTAKE_CONFIG` (environment variable)
//! 2. `~/.config/mailintake/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailintake\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::parser::eml::{ParserOptions, DEFAULT_MAX_MESSAGE_SIZE};
use crate::parser::transfer::DEFAULT_MAX_PART_SIZE;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Parser limits.
    pub parser: ParserConfig,
    /// Object store and repository locations.
    pub storage: StorageConfig,
    /// Ingestion pipeline switches.
    pub ingest: IngestConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
}

/// Parser limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Decoded bytes kept per body part (default: 26214400 = 25 MiB).
    pub max_part_size: usize,
    /// Largest raw message read from a stream (default: 268435456 = 256 MiB).
    pub max_message_size: usize,
}

/// Where raw messages come from and where parsed records go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the directory-backed object store.
    pub object_dir: Option<PathBuf>,
    /// Root of the JSON repository.
    pub data_dir: Option<PathBuf>,
    /// Key prefix for uploaded attachment objects.
    pub attachment_prefix: String,
}

/// Ingestion pipeline switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Sanitize HTML bodies before they are stored.
    pub sanitize_html: bool,
    /// Delete each source object once its message is stored.
    pub delete_after_ingest: bool,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            cache_dir: None,
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_part_size: DEFAULT_MAX_PART_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            object_dir: None,
            data_dir: None,
            attachment_prefix: "attachments/".to_string(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            sanitize_html: true,
            delete_after_ingest: true,
        }
    }
}

impl From<&ParserConfig> for ParserOptions {
    fn from(config: &ParserConfig) -> Self {
        Self {
            max_part_size: config.max_part_size,
            max_message_size: config.max_message_size,
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILINTAKE_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailintake").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailintake")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("mailintake.log")
}

/// Root of the object store: configured, else `<data dir>/mailintake/objects`.
pub fn object_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.storage.object_dir {
        return dir.clone();
    }
    default_data_root().join("objects")
}

/// Root of the JSON repository: configured, else `<data dir>/mailintake/db`.
pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.storage.data_dir {
        return dir.clone();
    }
    default_data_root().join("db")
}

fn default_data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailintake")
}
