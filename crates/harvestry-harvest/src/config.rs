use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::hal;

/// Configuration for harvestry.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (HARVESTRY_* prefix)
/// 3. Config file (~/.config/harvestry/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the SQLite database.
    ///
    /// Can be set via:
    /// - CLI: --db /path/to/db
    /// - ENV: HARVESTRY_DATABASE_PATH
    /// - Config: database_path = "/path/to/db"
    /// - Default: ~/.local/share/harvestry/harvestry.db
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,

    /// Endpoint of the HAL search API.
    ///
    /// Can be set via:
    /// - ENV: HARVESTRY_HAL_API_URL
    /// - Config: hal_api_url = "https://..."
    #[serde(default = "default_hal_api_url")]
    pub hal_api_url: String,

    /// Timeout applied to every outbound request, in seconds.
    ///
    /// Can be set via:
    /// - ENV: HARVESTRY_REQUEST_TIMEOUT_SECS
    /// - Config: request_timeout_secs = 30
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            hal_api_url: default_hal_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/harvestry/config.toml
    /// Reads environment variables with HARVESTRY_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut config = if config_path.exists() {
            let raw = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            Self::default()
        };

        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration with custom database path.
    ///
    /// This is used when the --db CLI flag is provided.
    pub fn load_with_db_path(db_path: PathBuf) -> Result<Self> {
        let mut config = Self::load()?;
        config.database_path = db_path;
        Ok(config)
    }

    /// The request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("HARVESTRY_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var("HARVESTRY_HAL_API_URL") {
            self.hal_api_url = url;
        }
        if let Ok(secs) = std::env::var("HARVESTRY_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = secs
                .parse()
                .context("HARVESTRY_REQUEST_TIMEOUT_SECS must be an integer")?;
        }
        Ok(())
    }
}

/// Get the default database path.
///
/// Returns: ~/.local/share/harvestry/harvestry.db (or platform equivalent)
fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("harvestry")
        .join("harvestry.db")
}

fn default_hal_api_url() -> String {
    hal::DEFAULT_API_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/harvestry/config.toml
/// - macOS: ~/Library/Application Support/harvestry/config.toml
/// - Windows: %APPDATA%\harvestry\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("harvestry")
        .join("config.toml")
}
