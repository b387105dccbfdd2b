//! Configuration management for quarry
//!
//! Default config location: ./quarry.toml

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Settings for the HTTP connection to the search cluster
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ConnectionConfig {
    #[serde(default = "default_url")]
    pub url: String,
    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_url() -> String {
    "http://127.0.0.1:9200".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Settings threaded into the [`Compiler`](crate::compiler::Compiler)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CompilerConfig {
    /// chrono strftime pattern used for timestamp clause values
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// Appended to every collection name in emitted requests
    #[serde(default)]
    pub index_suffix: String,
}

fn default_date_format() -> String {
    "%+".to_string()
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            date_format: default_date_format(),
            index_suffix: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from file, or fall back to defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            Ok(Config::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.connection.timeout_secs == 0 {
            return Err(Error::Config(
                "connection.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.compiler.date_format.is_empty() {
            return Err(Error::Config(
                "compiler.date_format must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
