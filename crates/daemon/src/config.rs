//! Configuration management for the FileDrop daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/filedrop/config.toml`.

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use protocol::{DEFAULT_PORT, HEADER_SIZE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest single message the daemon will buffer (2 GiB).
pub const MAX_MESSAGE_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("port must be non-zero")]
    InvalidPort,

    #[error("bind_address is not a valid IP address: {0}")]
    InvalidBindAddress(String),

    #[error("max_message_size must be between {min} and {max} bytes, got {got}")]
    InvalidMaxMessageSize { got: u64, min: u64, max: u64 },

    #[error("save_dir is not a directory: {0}")]
    InvalidSaveDir(PathBuf),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the FileDrop daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Listener and per-connection settings.
    pub server: ServerConfig,

    /// Where and how received files are stored.
    pub storage: StorageConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Directory for daily rolling log files. Logs go to stderr only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

/// Listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the listener to.
    pub bind_address: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Maximum size of one incoming message in bytes.
    pub max_message_size: u64,

    /// Seconds allowed for the WebSocket handshake (0 = no limit).
    pub handshake_timeout_secs: u64,

    /// Seconds a connection may go without sending any bytes (0 = no limit).
    /// A message that keeps arriving is never cut off, however long it takes.
    pub read_timeout_secs: u64,

    /// Seconds allowed to send an acknowledgment (0 = no limit).
    pub write_timeout_secs: u64,

    /// Maximum number of concurrent sessions (0 = unlimited).
    pub max_connections: usize,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory that receives uploaded files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_dir: Option<PathBuf>,

    /// Apply the client timestamp and capture metadata to stored files.
    pub apply_metadata: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_message_size: MAX_MESSAGE_SIZE,
            handshake_timeout_secs: 10,
            read_timeout_secs: 300, // 5 minutes
            write_timeout_secs: 30,
            max_connections: 0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            save_dir: None,
            apply_metadata: true,
        }
    }
}

impl ServerConfig {
    /// The socket address the listener binds to.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Handshake timeout, `None` when disabled.
    pub fn handshake_timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.handshake_timeout_secs)
    }

    /// Idle read timeout, `None` when disabled.
    pub fn read_timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.read_timeout_secs)
    }

    /// Acknowledgment write timeout, `None` when disabled.
    pub fn write_timeout(&self) -> Option<Duration> {
        secs_to_timeout(self.write_timeout_secs)
    }

    /// Message size limit as handed to the WebSocket layer.
    pub fn max_message_bytes(&self) -> usize {
        usize::try_from(self.max_message_size).unwrap_or(usize::MAX)
    }
}

fn secs_to_timeout(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filedrop")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - FILEDROP_SAVE_DIR: Override the save directory
    /// - FILEDROP_PORT: Override the listening port
    /// - FILEDROP_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("FILEDROP_SAVE_DIR") {
            if !dir.is_empty() {
                tracing::info!("Overriding save_dir from environment: {}", dir);
                self.storage.save_dir = Some(PathBuf::from(dir));
            }
        }

        if let Ok(port) = std::env::var("FILEDROP_PORT") {
            if !port.is_empty() {
                match port.parse::<u16>() {
                    Ok(port) => {
                        tracing::info!("Overriding port from environment: {}", port);
                        self.server.port = port;
                    }
                    Err(e) => {
                        tracing::warn!(value = %port, error = %e, "Ignoring invalid FILEDROP_PORT");
                    }
                }
            }
        }

        if let Ok(level) = std::env::var("FILEDROP_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        self.server.socket_addr()?;

        let size = self.server.max_message_size;
        if size < HEADER_SIZE as u64 || size > MAX_MESSAGE_SIZE {
            return Err(ConfigError::InvalidMaxMessageSize {
                got: size,
                min: HEADER_SIZE as u64,
                max: MAX_MESSAGE_SIZE,
            });
        }

        if let Some(dir) = &self.storage.save_dir {
            if !dir.is_dir() {
                return Err(ConfigError::InvalidSaveDir(dir.clone()));
            }
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.daemon.log_level, "info");
        assert!(config.daemon.log_dir.is_none());
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.max_message_size, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.server.max_connections, 0);
        assert!(config.storage.save_dir.is_none());
        assert!(config.storage.apply_metadata);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[server]
port = 6000
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.server.port, 6000);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.daemon.log_level, "info");
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[daemon]
log_level = "debug"
log_dir = "/var/log/filedrop"

[server]
bind_address = "127.0.0.1"
port = 5050
max_message_size = 1048576
handshake_timeout_secs = 5
read_timeout_secs = 0
write_timeout_secs = 15
max_connections = 64

[storage]
save_dir = "/srv/uploads"
apply_metadata = false
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.daemon.log_dir, Some(PathBuf::from("/var/log/filedrop")));
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.server.port, 5050);
        assert_eq!(config.server.max_message_size, 1_048_576);
        assert_eq!(config.server.handshake_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.server.read_timeout(), None);
        assert_eq!(config.server.write_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(config.server.max_connections, 64);
        assert_eq!(config.storage.save_dir, Some(PathBuf::from("/srv/uploads")));
        assert!(!config.storage.apply_metadata);
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[server\nport = 1");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[server]
port = "not a number"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut original = Config::default();
        original.server.port = 7000;
        original.storage.save_dir = Some(PathBuf::from("/tmp/drop"));
        original.daemon.log_level = "warn".to_string();

        let loaded = Config::from_toml(&original.to_toml().unwrap()).unwrap();

        assert_eq!(original, loaded);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = Config::default();
        original.server.max_connections = 8;
        original.save(&config_path).unwrap();

        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(original, loaded);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "invalid [ toml").unwrap();

        let err = Config::load(&config_path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_validate_port_zero() {
        let mut config = Config::default();
        config.server.port = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPort));
    }

    #[test]
    fn test_validate_bind_address() {
        let mut config = Config::default();
        config.server.bind_address = "not-an-ip".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidBindAddress("not-an-ip".to_string()))
        );
    }

    #[test]
    fn test_validate_max_message_size() {
        let mut config = Config::default();
        config.server.max_message_size = 4;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMaxMessageSize { got: 4, .. })
        ));

        config.server.max_message_size = MAX_MESSAGE_SIZE + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMaxMessageSize { .. })
        ));
    }

    #[test]
    fn test_validate_save_dir() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();

        config.storage.save_dir = Some(temp_dir.path().to_path_buf());
        assert_eq!(config.validate(), Ok(()));

        let missing = temp_dir.path().join("missing");
        config.storage.save_dir = Some(missing.clone());
        assert_eq!(config.validate(), Err(ConfigError::InvalidSaveDir(missing)));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.daemon.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );

        config.daemon.log_level = "DEBUG".to_string();
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_socket_addr() {
        let mut config = ServerConfig::default();
        config.bind_address = "127.0.0.1".to_string();
        config.port = 5001;
        assert_eq!(
            config.socket_addr().unwrap(),
            "127.0.0.1:5001".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("filedrop"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    #[serial]
    fn test_env_override_save_dir_and_port() {
        std::env::set_var("FILEDROP_SAVE_DIR", "/tmp/filedrop-env");
        std::env::set_var("FILEDROP_PORT", "6100");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.storage.save_dir, Some(PathBuf::from("/tmp/filedrop-env")));
        assert_eq!(config.server.port, 6100);

        std::env::remove_var("FILEDROP_SAVE_DIR");
        std::env::remove_var("FILEDROP_PORT");
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_port_is_ignored() {
        std::env::set_var("FILEDROP_PORT", "seventy");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.server.port, DEFAULT_PORT);

        std::env::remove_var("FILEDROP_PORT");
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        std::env::set_var("FILEDROP_LOG_LEVEL", "");
        std::env::remove_var("FILEDROP_SAVE_DIR");
        std::env::remove_var("FILEDROP_PORT");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config, Config::default());

        std::env::remove_var("FILEDROP_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::set_var("FILEDROP_LOG_LEVEL", "trace");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.daemon.log_level, "trace");

        std::env::remove_var("FILEDROP_LOG_LEVEL");
    }
}
