#![deny(unsafe_code)]

//! Configuration loading and validation for banbridge.
//!
//! Loads TOML configuration files and validates them. Provides the
//! [`AppConfig`] type as the central configuration structure, and the
//! [`aliases`] module with the reply label table used by the status parsers.

/// Ordered reply label aliases per status field.
pub mod aliases;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use aliases::KeyAliases;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Control socket bridge configuration.
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// HTTP API configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Reply label aliases.
    #[serde(default)]
    pub aliases: KeyAliases,
}

/// Configuration for the fail2ban control socket connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Path to the fail2ban control socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Upper bound on one request/response exchange, in seconds.
    ///
    /// Unset means the bridge waits for the daemon indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl BridgeConfig {
    /// The exchange timeout as a [`Duration`], if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            timeout_secs: None,
        }
    }
}

fn default_socket_path() -> String {
    "/var/run/fail2ban/fail2ban.sock".to_string()
}

/// Configuration for the HTTP API and static file server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP API binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Port the HTTP API binds to.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Directory served for non-API paths.
    #[serde(default = "default_static_root")]
    pub static_root: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            static_root: default_static_root(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    9000
}

fn default_static_root() -> String {
    "public".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path).await?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file without validating it, for callers that layer
    /// overrides on top and validate the result themselves.
    pub async fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: AppConfig = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.socket_path.is_empty() {
            return Err(ConfigError::Validation(
                "bridge.socket_path must not be empty".to_string(),
            ));
        }
        if self.bridge.timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "bridge.timeout_secs must be non-zero when set".to_string(),
            ));
        }
        if self.server.listen_port == 0 {
            return Err(ConfigError::Validation(
                "server.listen_port must be non-zero".to_string(),
            ));
        }
        if self.server.listen_addr.is_empty() {
            return Err(ConfigError::Validation(
                "server.listen_addr must not be empty".to_string(),
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }

        for (field, list) in self.aliases.fields() {
            if list.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "aliases.{field} must list at least one label"
                )));
            }
            if let Some(i) = list.iter().position(|label| label.trim().is_empty()) {
                return Err(ConfigError::Validation(format!(
                    "aliases.{field}[{i}] must not be blank"
                )));
            }
        }

        Ok(())
    }
}
