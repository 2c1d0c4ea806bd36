//! Configuration module for Pocketsync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, and defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for Pocketsync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub sync: SyncConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Minimum seconds between remote refresh pulls; calls inside the gap
    /// coalesce into no-ops.
    pub refresh_min_gap_secs: u64,
    /// Minimum seconds between outbox flush attempts.
    pub flush_min_gap_secs: u64,
    /// Milliseconds a draft must be quiet before it is persisted.
    pub draft_debounce_ms: u64,
    /// Consecutive permanent rejections before an action is parked out of
    /// the automatic drain.
    pub max_rejections: u32,
    /// Record field holding the photo-list of upload references.
    pub photo_field: String,
}

/// Remote store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the row-oriented data service.
    pub base_url: String,
    /// Table holding one row per identity.
    pub table: String,
    /// Column carrying the owning identity.
    pub identity_column: String,
    /// Blob storage bucket for photo uploads.
    pub blob_bucket: String,
    /// API key sent with each request. `None` for anonymous/test setups.
    pub api_key: Option<String>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Path to the log file.
    pub file: PathBuf,
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/pocketsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("pocketsync")
            .join("config.yaml")
    }
}

impl SyncConfig {
    /// Refresh gap as a [`Duration`]
    pub fn refresh_min_gap(&self) -> Duration {
        Duration::from_secs(self.refresh_min_gap_secs)
    }

    /// Flush gap as a [`Duration`]
    pub fn flush_min_gap(&self) -> Duration {
        Duration::from_secs(self.flush_min_gap_secs)
    }

    /// Draft debounce as a [`Duration`]
    pub fn draft_debounce(&self) -> Duration {
        Duration::from_millis(self.draft_debounce_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_min_gap_secs: 2,
            flush_min_gap_secs: 2,
            draft_debounce_ms: 750,
            max_rejections: 5,
            photo_field: "pictures".to_string(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            table: "profiles".to_string(),
            identity_column: "user_id".to_string(),
            blob_bucket: "profile-photos".to_string(),
            api_key: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: dirs::state_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/state"))
                .join("pocketsync")
                .join("pocketsync.log"),
        }
    }
}
