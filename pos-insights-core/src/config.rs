//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/pos-insights/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/pos-insights/` (~/.config/pos-insights/)
//! - Data: `$XDG_DATA_HOME/pos-insights/` (~/.local/share/pos-insights/)
//! - State/Logs: `$XDG_STATE_HOME/pos-insights/` (~/.local/state/pos-insights/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "pos-insights";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Override for the SQLite record store location
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Report cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where cached reports live.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local; discarded on exit
    #[default]
    Memory,
    /// `report_cache` table in the record store; survives restarts
    Database,
}

/// Report cache configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Lifetime of a cached profit-margin report in seconds
    #[serde(default = "default_profit_margin_ttl")]
    pub profit_margin_ttl_secs: u64,

    /// Lifetime of the cached inventory-aging report in seconds
    #[serde(default = "default_inventory_ttl")]
    pub inventory_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            profit_margin_ttl_secs: default_profit_margin_ttl(),
            inventory_ttl_secs: default_inventory_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn profit_margin_ttl(&self) -> Duration {
        Duration::from_secs(self.profit_margin_ttl_secs)
    }

    pub fn inventory_ttl(&self) -> Duration {
        Duration::from_secs(self.inventory_ttl_secs)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.profit_margin_ttl_secs == 0 {
            return Err(Error::Config(
                "cache.profit_margin_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.inventory_ttl_secs == 0 {
            return Err(Error::Config(
                "cache.inventory_ttl_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_profit_margin_ttl() -> u64 {
    60 * 60
}

fn default_inventory_ttl() -> u64 {
    6 * 60 * 60
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.cache.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/pos-insights/config.toml`
    pub fn config_path() -> PathBuf {
        xdg_config_home().join(APP_DIR).join("config.toml")
    }

    /// Returns the data directory path (for the SQLite record store)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join(APP_DIR)
    }

    /// Returns the state directory path (for logs)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join(APP_DIR)
    }

    /// Returns the default database file path
    ///
    /// `$XDG_DATA_HOME/pos-insights/data.db`
    pub fn default_database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Database path honoring the `database_path` override.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(Self::default_database_path)
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/pos-insights/pos-insights.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("pos-insights.log")
    }
}
