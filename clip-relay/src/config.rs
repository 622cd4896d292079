//! Configuration loading for clip-relay.
//!
//! Configuration is loaded from a TOML file (default: `relay.toml`).

use crate::http::{HEALTH_PATH, METRICS_PATH};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for clip-relay.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// WebSocket endpoint configuration.
    #[serde(default)]
    pub websocket: WebSocketConfig,
    /// Keepalive timing configuration.
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP/WebSocket listener (default: 0.0.0.0:8080).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// WebSocket endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Upgrade path (default: /ws).
    #[serde(default = "default_ws_path")]
    pub path: String,
    /// Maximum simultaneous connections (default: 1000).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Socket write buffer size in bytes (default: 4KB).
    #[serde(default = "default_write_buffer_size")]
    pub write_buffer_size: usize,
    /// Largest accepted inbound message in bytes (default: 16MB, images included).
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Frames queued per connection before the connection is evicted (default: 256).
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
}

/// Keepalive timing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct KeepaliveConfig {
    /// Seconds without inbound activity before a connection is dropped (default: 60).
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Seconds between pings (default: 54). Must be below `read_timeout_secs`.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Seconds allowed for a single write (default: 10).
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum WebSocket upgrades per IP address per minute (default: 30).
    #[serde(default = "default_connections_per_ip")]
    pub connections_per_ip: u32,
    /// Maximum inbound frames per connection per minute (default: 600).
    #[serde(default = "default_messages_per_minute")]
    pub messages_per_minute: u32,
    /// Seconds between evictions of idle rate limiter entries (default: 300, 0 disables).
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset (default: info).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON log lines instead of human-readable ones (default: false).
    #[serde(default)]
    pub json: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_connections() -> usize {
    1000
}

fn default_write_buffer_size() -> usize {
    4096
}

fn default_max_message_size() -> usize {
    16 * 1024 * 1024 // 16MB
}

fn default_outbox_capacity() -> usize {
    256
}

fn default_read_timeout_secs() -> u64 {
    60
}

fn default_ping_interval_secs() -> u64 {
    54
}

fn default_write_timeout_secs() -> u64 {
    10
}

fn default_connections_per_ip() -> u32 {
    30
}

fn default_messages_per_minute() -> u32 {
    600
}

fn default_cleanup_interval() -> u64 {
    300 // 5 minutes
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: default_ws_path(),
            max_connections: default_max_connections(),
            write_buffer_size: default_write_buffer_size(),
            max_message_size: default_max_message_size(),
            outbox_capacity: default_outbox_capacity(),
        }
    }
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            read_timeout_secs: default_read_timeout_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            connections_per_ip: default_connections_per_ip(),
            messages_per_minute: default_messages_per_minute(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl KeepaliveConfig {
    /// Inbound inactivity deadline.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Interval between keepalive pings.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Deadline for a single write.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.websocket.path.starts_with('/') {
            return Err(invalid("websocket.path must start with '/'"));
        }
        if [HEALTH_PATH, METRICS_PATH].contains(&self.websocket.path.as_str()) {
            return Err(invalid("websocket.path collides with a built-in HTTP route"));
        }
        if self.websocket.outbox_capacity == 0 {
            return Err(invalid("websocket.outbox_capacity must be > 0"));
        }
        if self.websocket.max_connections == 0 {
            return Err(invalid("websocket.max_connections must be > 0"));
        }
        if self.keepalive.ping_interval_secs == 0 {
            return Err(invalid("keepalive.ping_interval_secs must be > 0"));
        }
        // The peer's pong has to land before the read deadline lapses.
        if self.keepalive.ping_interval_secs >= self.keepalive.read_timeout_secs {
            return Err(invalid(
                "keepalive.ping_interval_secs must be shorter than keepalive.read_timeout_secs",
            ));
        }
        if self.keepalive.write_timeout_secs == 0 {
            return Err(invalid("keepalive.write_timeout_secs must be > 0"));
        }
        if self.limits.connections_per_ip == 0 || self.limits.messages_per_minute == 0 {
            return Err(invalid("limits quotas must be > 0"));
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.to_string(),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Configuration values are inconsistent.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}
