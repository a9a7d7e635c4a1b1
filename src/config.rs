//! Configuration
//!
//! Server settings loaded from an optional TOML file. Every field has a
//! default, so an empty file (or no file) yields a working server.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::DEFAULT_OUTBOUND_CAPACITY;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to
    pub bind_addr: String,
    /// Per-client outbound queue capacity
    pub outbound_capacity: usize,
    /// Per-room dispatch channel capacity
    pub room_channel_capacity: usize,
    /// Hub command channel capacity
    pub hub_channel_capacity: usize,
    /// Chat frames kept per room for replay (0 disables history)
    pub history_limit: usize,
    /// Largest accepted inbound message, in bytes
    pub max_message_bytes: usize,
    /// Inbound frame rate limit per connection
    pub rate_limit: RateLimitConfig,
    /// Default tracing filter, overridden by RUST_LOG
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            room_channel_capacity: 1024,
            hub_channel_capacity: 256,
            history_limit: 100,
            max_message_bytes: 64 * 1024,
            rate_limit: RateLimitConfig::default(),
            log_filter: "room_hub=info".to_string(),
        }
    }
}

/// Token bucket settings; a zero in either field disables limiting
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Frames that may arrive back to back
    pub burst: u32,
    /// Sustained frames per second
    pub per_second: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst: 20,
            per_second: 10,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the hub cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacities = [
            ("outbound_capacity", self.outbound_capacity),
            ("room_channel_capacity", self.room_channel_capacity),
            ("hub_channel_capacity", self.hub_channel_capacity),
            ("max_message_bytes", self.max_message_bytes),
        ];
        for (name, value) in capacities {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be greater than 0", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config.outbound_capacity, 256);
        assert_eq!(config.history_limit, 100);
        assert_eq!(config.rate_limit.burst, 20);
    }

    #[test]
    fn test_partial_config() {
        let config = ServerConfig::from_toml(
            r#"
            bind_addr = "0.0.0.0:9000"
            history_limit = 0

            [rate_limit]
            per_second = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.history_limit, 0);
        assert_eq!(config.rate_limit.per_second, 0);
        assert_eq!(config.rate_limit.burst, 20);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = ServerConfig::from_toml("outbound_capacity = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("outbound_capacity")));
    }

    #[test]
    fn test_bad_toml_rejected() {
        assert!(matches!(
            ServerConfig::from_toml("history_limit = \"lots\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "room_channel_capacity = 8").unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.room_channel_capacity, 8);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ServerConfig::from_file("/definitely/not/here.toml"),
            Err(ConfigError::Io(_))
        ));
    }
}
