//! Configuration for the odsql binary
//!
//! Loads configuration from:
//! 1. odsql.yaml - registry location, dialect, database, logging
//! 2. .env file - loaded into the environment before anything else
//!
//! Environment variables always override odsql.yaml values; command line
//! flags override both.

use std::path::Path;

use odsql_compiler::DialectKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid dialect: {0}")]
    InvalidDialect(String),
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directives (trace, debug, info, warn, error) or module-specific
    pub level: String,

    /// Output format: pretty, json, compact
    pub format: String,

    /// Output destination: stderr, file, both
    pub output: String,

    /// Directory for log files
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "compact".to_string(),
            output: "stderr".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema registry file, YAML or JSON.
    pub registry: String,
    pub dialect: String,
    /// SQLite database used by `query` and `count --execute`.
    pub database: Option<String>,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: "schemas.yaml".to_string(),
            dialect: "sqlite".to_string(),
            database: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file with environment variable
    /// overrides. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_yaml_str(&std::fs::read_to_string(path)?)?
        } else {
            Config::default()
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        if source.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yaml::from_str(source)?)
    }

    /// Apply overrides from `var`, which looks up one environment variable.
    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(registry) = var("ODSQL_REGISTRY") {
            self.registry = registry;
        }
        if let Some(dialect) = var("ODSQL_DIALECT") {
            self.dialect = dialect;
        }
        if let Some(database) = var("ODSQL_DATABASE") {
            self.database = Some(database);
        }

        if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(output) = var("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Some(dir) = var("LOG_DIR") {
            self.logging.directory = dir;
        }
    }

    pub fn dialect_kind(&self) -> Result<DialectKind, ConfigError> {
        self.dialect.parse().map_err(ConfigError::InvalidDialect)
    }
}
