use crate::error::config::ConfigError;

use common::{DEFAULT_HOST, DEFAULT_PORT, ErrorLocation, READ_BUFFER_SIZE};

use std::panic::Location;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

const MAX_READ_BUFFER_SIZE: usize = 64 * 1024;

// ============================================
// CONFIG STRUCTS
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// `0` binds an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bytes per read. A message larger than this may arrive split.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    #[serde(default = "default_accept_retry_max_elapsed_ms")]
    pub accept_retry_max_elapsed_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            read_buffer_size: default_read_buffer_size(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            accept_retry_max_elapsed_ms: default_accept_retry_max_elapsed_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_read_buffer_size() -> usize {
    READ_BUFFER_SIZE
}
fn default_shutdown_grace_ms() -> u64 {
    5_000
}
fn default_accept_retry_max_elapsed_ms() -> u64 {
    30_000
}

// ============================================
// IMPLEMENTATION
// ============================================

impl ServerConfig {
    /// Load server config from a TOML file.
    ///
    /// Missing keys fall back to their defaults. A missing file is not an
    /// error: defaults are returned and a message is logged.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read, parsed
    /// or validated.
    pub fn load(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            info!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(config_path).map_err(|e| {
            warn!("Failed to read config file: {}", e);
            ConfigError::ReadError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.to_path_buf(),
                source: e,
            }
        })?;

        let config: ServerConfig = toml::from_str(&contents).map_err(|e| {
            warn!("Failed to parse config TOML: {}", e);
            ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        config.validate()?;

        info!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_host(&self.host)?;

        if self.read_buffer_size == 0 || self.read_buffer_size > MAX_READ_BUFFER_SIZE {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid read buffer size: {} (must be 1-{})",
                    self.read_buffer_size, MAX_READ_BUFFER_SIZE
                ),
            });
        }

        if self.shutdown_grace_ms == 0 {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "shutdown_grace_ms must be greater than zero".to_string(),
            });
        }

        if self.accept_retry_max_elapsed_ms == 0 {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "accept_retry_max_elapsed_ms must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn accept_retry_max_elapsed(&self) -> Duration {
        Duration::from_millis(self.accept_retry_max_elapsed_ms)
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_host(&self.host)?;

        if self.port == 0 {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: "Client cannot connect to port 0".to_string(),
            });
        }

        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[track_caller]
fn validate_host(host: &str) -> Result<(), ConfigError> {
    if host.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            location: ErrorLocation::from(Location::caller()),
            reason: "host cannot be empty".to_string(),
        });
    }
    Ok(())
}
