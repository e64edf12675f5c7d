//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$WORKSHOP_CONFIG` (environment variable)
//! 2. `~/.config/workshop/config.toml` (Linux/macOS)
//!    `%APPDATA%\workshop\config.toml` (Windows)
//! 3. Built-in defaults

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::activesync::codepages::air_sync::filter_type;
use crate::chew::links::LinkConfig;
use crate::error::{Result, SyncError};
use crate::model::SyncRange;
use crate::toc::TocManager;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Sync window and protocol defaults.
    pub sync: SyncConfig,
    /// Link extraction for event descriptions.
    pub links: LinkConfig,
    /// Static TOC namespaces: `[namespaces.<ns>]` with `<name> = [items]`.
    pub namespaces: BTreeMap<String, BTreeMap<String, Vec<Value>>>,
}

/// General behavior settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Sync window and protocol defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Days before now covered by the calendar sync window.
    pub window_days_past: i64,
    /// Days after now covered by the calendar sync window.
    pub window_days_future: i64,
    /// ActiveSync FilterType sent with folder syncs ("0" to "8").
    pub activesync_filter_type: String,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            window_days_past: 15,
            window_days_future: 60,
            activesync_filter_type: filter_type::TWO_WEEKS_BACK.to_string(),
        }
    }
}

impl SyncConfig {
    /// The configured window around `now`.
    pub fn window_at(&self, now: DateTime<Utc>) -> SyncRange {
        SyncRange::around(now, self.window_days_past, self.window_days_future)
    }
}

impl Config {
    /// Register every `[namespaces.*]` table as a static TOC namespace.
    pub fn register_namespaces(&self, manager: &TocManager) -> Result<()> {
        for (namespace, entries) in &self.namespaces {
            let value = serde_json::to_value(entries)?;
            manager.register_namespace_value(namespace.clone(), value)?;
        }
        Ok(())
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    match config_file_path() {
        Some(path) if path.exists() => load_config_from(&path),
        _ => Config::default(),
    }
}

/// Load configuration from an explicit path, falling back to defaults.
pub fn load_config_from(path: &Path) -> Config {
    match std::fs::read_to_string(path).map_err(|e| SyncError::io(path, e)) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            Config::default()
        }
    }
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;
    save_config_to(config, &path)
}

/// Save configuration to an explicit path, creating parent directories.
pub fn save_config_to(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents).map_err(|e| SyncError::io(path, e))?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("WORKSHOP_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("workshop").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("workshop")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("workshop.log")
}
