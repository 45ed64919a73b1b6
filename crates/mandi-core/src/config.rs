//! Configuration management for mandi.
//!
//! Loads configuration from ${MANDI_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "http://localhost:8001";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the assistant backend.
    pub base_url: String,
    /// Session identifier to reuse across requests. Opaque to the core;
    /// minted by the backend when absent.
    pub session_id: Option<String>,
    /// Connection timeout in seconds. Streams themselves have no deadline.
    pub connect_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            session_id: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Loads config from the default path, applying env overrides.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&config_path())?;
        if let Ok(url) = std::env::var("MANDI_BASE_URL") {
            let trimmed = url.trim();
            if !trimmed.is_empty() {
                config.base_url = trimmed.to_string();
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Loads config from a specific path, or defaults if it does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Validates config invariants.
    ///
    /// # Errors
    /// Returns an error if the base URL is not well-formed.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url)
            .with_context(|| format!("Invalid backend base URL: {}", self.base_url))?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Resolves the mandi home directory.
///
/// Checks MANDI_HOME env var first, falls back to ~/.config/mandi.
pub fn mandi_home() -> PathBuf {
    if let Ok(home) = std::env::var("MANDI_HOME") {
        return PathBuf::from(home);
    }

    std::env::var_os("HOME")
        .map(|h| PathBuf::from(h).join(".config").join("mandi"))
        .unwrap_or_else(|| PathBuf::from(".mandi"))
}

/// Returns the path to the config.toml file.
pub fn config_path() -> PathBuf {
    mandi_home().join("config.toml")
}
