//! Configuration management for jimaku-button.
//!
//! This module handles loading and parsing configuration from TOML files,
//! with sensible defaults for all settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory settings
    pub data: DataConfig,

    /// Database settings
    pub database: DatabaseConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Subtitle service settings
    #[serde(default)]
    pub jimaku: JimakuConfig,
}

/// Data directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root data directory path
    pub root_dir: String,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path (relative to data directory or absolute)
    pub path: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log directory path (relative to data directory or absolute)
    pub log_dir: String,

    /// Default log level (trace, debug, info, warn, error)
    pub default_level: String,

    /// Enable console output
    pub console: bool,

    /// Enable file output
    pub file: bool,

    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

/// Subtitle service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JimakuConfig {
    /// Service base URL, used for both API calls and deep links
    pub base_url: String,

    /// User agent sent with every request
    pub user_agent: String,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// How long a failed lookup is suppressed, in seconds
    pub cooldown_seconds: u64,

    /// Entry fetched to check whether an API key is accepted
    pub verification_entry_id: u64,
}

impl Default for JimakuConfig {
    fn default() -> Self {
        Self {
            base_url: "https://jimaku.cc".to_string(),
            user_agent: "Rapptz/jimaku-button-ext".to_string(),
            timeout_seconds: 30,
            cooldown_seconds: 600,
            verification_entry_id: 729,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig {
                root_dir: "data".to_string(),
            },
            database: DatabaseConfig {
                path: "storage.db".to_string(),
            },
            logging: LoggingConfig {
                log_dir: "logs".to_string(),
                default_level: "info".to_string(),
                console: true,
                file: true,
                json_format: false,
            },
            jimaku: JimakuConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// If the file doesn't exist, returns the default configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration saved successfully"
        );

        Ok(())
    }

    /// Get the absolute path for the data directory
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.root_dir)
    }

    /// Get the absolute path for the database file
    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.database.path)
    }

    /// Get the absolute path for the log directory
    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.logging.log_dir)
    }

    /// Cooldown applied to failed lookups
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.jimaku.cooldown_seconds)
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir().join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.data.root_dir, "data");
        assert_eq!(config.database.path, "storage.db");
        assert_eq!(config.jimaku.base_url, "https://jimaku.cc");
        assert_eq!(config.jimaku.user_agent, "Rapptz/jimaku-button-ext");
        assert_eq!(config.cooldown(), Duration::from_secs(600));
    }

    #[test]
    fn test_save_and_load_config() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");

        let mut original_config = Config::default();
        original_config.jimaku.cooldown_seconds = 30;
        original_config.save(&config_path)?;

        assert!(config_path.exists());

        let loaded_config = Config::from_file(&config_path)?;
        assert_eq!(loaded_config.data.root_dir, original_config.data.root_dir);
        assert_eq!(loaded_config.jimaku.cooldown_seconds, 30);

        Ok(())
    }

    #[test]
    fn test_missing_jimaku_section_uses_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[data]
root_dir = "state"

[database]
path = "kv.db"

[logging]
log_dir = "logs"
default_level = "debug"
console = true
file = false
json_format = false
"#,
        )?;

        let config = Config::from_file(&config_path)?;
        assert_eq!(config.data.root_dir, "state");
        assert_eq!(config.jimaku.verification_entry_id, 729);

        Ok(())
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        // Should return default config without error
        assert_eq!(config.data.root_dir, "data");
    }

    #[test]
    fn test_path_resolution() {
        let mut config = Config::default();

        assert!(config.database_path().ends_with("data/storage.db"));
        assert!(config.log_dir().ends_with("data/logs"));

        config.database.path = "/var/lib/jimaku/storage.db".to_string();
        assert_eq!(
            config.database_path(),
            PathBuf::from("/var/lib/jimaku/storage.db")
        );
    }
}
