//! Configuration loading for the multiplexer server.
//!
//! Sources, lowest precedence first:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables with the `MULTIPLEXER_` prefix
//!
//! # Example
//!
//! ```ignore
//! use multiplexer::config::MultiplexerConfig;
//!
//! // Load from file with env overrides
//! let config = MultiplexerConfig::load("config.yaml")?;
//!
//! // Or load from environment only
//! let config = MultiplexerConfig::from_env()?;
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::admission::DEFAULT_ADMISSION_CAPACITY;
use crate::batch::MAX_URLS;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct MultiplexerConfig {
    /// Listener and shutdown settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Batch and admission limits
    #[serde(default)]
    pub limits: LimitSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Server network settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerSettings {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// How long in-flight requests may keep running after a shutdown signal
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl ServerSettings {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8082
}

fn default_shutdown_grace() -> u64 {
    10
}

/// Limits applied to every batch.
///
/// Environment variables use `__` between sections, e.g.
/// `MULTIPLEXER_LIMITS__MAX_PARALLEL_FETCHES=8`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LimitSettings {
    /// Largest batch accepted; bigger ones fail validation
    #[serde(default = "default_max_urls")]
    pub max_urls: usize,

    /// Item fetches allowed to run at once within a batch
    #[serde(default = "default_max_parallel_fetches")]
    pub max_parallel_fetches: usize,

    /// Deadline per item in milliseconds
    #[serde(default = "default_item_timeout_ms")]
    pub item_timeout_ms: u64,

    /// Batches allowed to run at once across the whole process
    #[serde(default = "default_admission_capacity")]
    pub admission_capacity: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_urls: default_max_urls(),
            max_parallel_fetches: default_max_parallel_fetches(),
            item_timeout_ms: default_item_timeout_ms(),
            admission_capacity: default_admission_capacity(),
        }
    }
}

fn default_max_urls() -> usize {
    MAX_URLS
}

fn default_max_parallel_fetches() -> usize {
    4
}

fn default_item_timeout_ms() -> u64 {
    1000
}

fn default_admission_capacity() -> usize {
    DEFAULT_ADMISSION_CAPACITY
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable text
    #[serde(default = "default_true")]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: true,
        }
    }
}

fn default_log_level() -> String {
    "debug".to_string()
}

fn default_true() -> bool {
    true
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

const ENV_PREFIX: &str = "MULTIPLEXER";

impl MultiplexerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// `MULTIPLEXER_SERVER__PORT=9090` overrides `server.port`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&MultiplexerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(env_source())
            .build()?;

        let loaded: MultiplexerConfig = config.try_deserialize()?;
        loaded.validate()?;

        Ok(loaded)
    }

    /// Load configuration from defaults and environment variables only.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&MultiplexerConfig::default())?)
            .add_source(env_source())
            .build()?;

        let loaded: MultiplexerConfig = config.try_deserialize()?;
        loaded.validate()?;

        Ok(loaded)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be greater than 0"));
        }

        let limits = &self.limits;
        if limits.max_urls == 0 {
            return Err(invalid("limits.max_urls must be greater than 0"));
        }
        if limits.max_parallel_fetches == 0 {
            return Err(invalid("limits.max_parallel_fetches must be greater than 0"));
        }
        if limits.item_timeout_ms == 0 {
            return Err(invalid("limits.item_timeout_ms must be greater than 0"));
        }
        if limits.admission_capacity == 0 {
            return Err(invalid("limits.admission_capacity must be greater than 0"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        Ok(())
    }
}

fn env_source() -> Environment {
    // MULTIPLEXER_LIMITS__MAX_URLS -> limits.max_urls
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

fn invalid(message: &str) -> ConfigLoadError {
    ConfigLoadError::Invalid {
        message: message.to_string(),
    }
}
