// ============================================
// File: crates/shadowchat-node/src/config.rs
// ============================================
//! # Node Configuration
//!
//! ## Creation Reason
//! Provides configuration management for the ShadowChat relay and client,
//! loaded from a TOML file with defaults for every field.
//!
//! ## Main Functionality
//! - `NodeConfig`: Main configuration structure
//! - TOML file loading and parsing
//! - Configuration validation
//!
//! ## Configuration Sections
//! - `network`: Relay listen address and WebSocket path
//! - `limits`: Connection count, outbound queue size, frame size, idle timeout
//! - `crypto`: RSA modulus size and session key size
//! - `client`: Relay URL and optional identity key file
//! - `logging`: Log level
//!
//! ## Example Configuration
//! ```toml
//! [network]
//! listen_addr = "0.0.0.0:8080"
//! path = "/ws"
//!
//! [limits]
//! max_connections = 1000
//! outbound_queue_capacity = 256
//! max_frame_size = 1048576
//! idle_timeout_secs = 0
//!
//! [crypto]
//! rsa_bits = 2048
//! session_key_size = 32
//!
//! [client]
//! server_url = "ws://127.0.0.1:8080/ws"
//! key_file = "/home/alice/.shadowchat/identity.json"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - All config changes require a restart
//! - Validate config before server startup
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use shadowchat_core::crypto::{
    DEFAULT_RSA_BITS, DEFAULT_SESSION_KEY_SIZE, MAX_RSA_BITS, MIN_RSA_BITS, VALID_KEY_SIZES,
};
use shadowchat_core::protocol::MAX_FRAME_SIZE;

use crate::error::{NodeError, Result};

// ============================================
// NodeConfig
// ============================================

/// Main node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Key sizes.
    #[serde(default)]
    pub crypto: CryptoConfig,

    /// Client role settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NodeConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns error if file cannot be read, parsed or validated.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        info!("Loading configuration from: {}", path_str);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| NodeError::config_load(&path_str, e.to_string()))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| NodeError::config_load(&path_str, e.to_string()))?;

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Loads the file if it exists, otherwise returns defaults.
    ///
    /// # Errors
    /// Returns error if an existing file is invalid.
    pub async fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            info!("Config file {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Loads configuration from a string (useful for testing).
    ///
    /// # Errors
    /// Returns error if the string cannot be parsed or validated.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| NodeError::config_load("<string>", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns `ConfigInvalid` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.limits.validate()?;
        self.crypto.validate()?;
        self.client.validate()?;
        Ok(())
    }

    /// Serializes configuration to TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

// ============================================
// NetworkConfig
// ============================================

/// Network configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// TCP listen address for the relay.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// HTTP path that accepts the WebSocket upgrade.
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

fn default_path() -> String {
    "/ws".to_string()
}

impl NetworkConfig {
    fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') {
            return Err(NodeError::config_invalid(
                "network.path",
                "must start with '/'",
            ));
        }
        Ok(())
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            path: default_path(),
        }
    }
}

// ============================================
// LimitsConfig
// ============================================

/// Resource limits configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent connections on the relay.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Frames buffered per connection before senders block.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,

    /// Largest inbound frame, in bytes, a session will decode.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Seconds without an inbound frame before the relay drops a session.
    /// Zero disables the timeout.
    #[serde(default)]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> usize {
    1000
}

fn default_outbound_queue_capacity() -> usize {
    256
}

fn default_max_frame_size() -> usize {
    MAX_FRAME_SIZE
}

impl LimitsConfig {
    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(NodeError::config_invalid(
                "limits.max_connections",
                "must be greater than 0",
            ));
        }

        if self.outbound_queue_capacity == 0 {
            return Err(NodeError::config_invalid(
                "limits.outbound_queue_capacity",
                "must be greater than 0",
            ));
        }

        if self.max_frame_size == 0 {
            return Err(NodeError::config_invalid(
                "limits.max_frame_size",
                "must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Returns the idle timeout, or `None` when disabled.
    #[must_use]
    pub const fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_secs))
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            max_frame_size: default_max_frame_size(),
            idle_timeout_secs: 0,
        }
    }
}

// ============================================
// CryptoConfig
// ============================================

/// Key size configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// RSA modulus size for generated identities.
    #[serde(default = "default_rsa_bits")]
    pub rsa_bits: usize,

    /// AES key size in bytes for session keys this node issues.
    #[serde(default = "default_session_key_size")]
    pub session_key_size: usize,
}

fn default_rsa_bits() -> usize {
    DEFAULT_RSA_BITS
}

fn default_session_key_size() -> usize {
    DEFAULT_SESSION_KEY_SIZE
}

impl CryptoConfig {
    fn validate(&self) -> Result<()> {
        if !(MIN_RSA_BITS..=MAX_RSA_BITS).contains(&self.rsa_bits) || self.rsa_bits % 8 != 0 {
            return Err(NodeError::config_invalid(
                "crypto.rsa_bits",
                format!("must be a multiple of 8 between {MIN_RSA_BITS} and {MAX_RSA_BITS}"),
            ));
        }

        if !VALID_KEY_SIZES.contains(&self.session_key_size) {
            return Err(NodeError::config_invalid(
                "crypto.session_key_size",
                "must be 16, 24 or 32",
            ));
        }

        Ok(())
    }
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            rsa_bits: default_rsa_bits(),
            session_key_size: default_session_key_size(),
        }
    }
}

// ============================================
// ClientConfig
// ============================================

/// Client role configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Relay URL to dial.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Persisted RSA identity; a fresh one is generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
}

fn default_server_url() -> String {
    "ws://127.0.0.1:8080/ws".to_string()
}

impl ClientConfig {
    fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://")) {
            return Err(NodeError::config_invalid(
                "client.server_url",
                "must be a ws:// or wss:// URL",
            ));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            key_file: None,
        }
    }
}

// ============================================
// LoggingConfig
// ============================================

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
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

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.listen_addr.port(), 8080);
        assert_eq!(config.network.path, "/ws");
        assert_eq!(config.limits.outbound_queue_capacity, 256);
        assert_eq!(config.limits.max_frame_size, 1024 * 1024);
        assert_eq!(config.limits.idle_timeout(), None);
        assert_eq!(config.crypto.rsa_bits, 2048);
        assert_eq!(config.crypto.session_key_size, 32);
    }

    #[test]
    fn test_full_config_format() {
        let toml = r#"
            [network]
            listen_addr = "127.0.0.1:9000"
            path = "/chat"

            [limits]
            max_connections = 10
            outbound_queue_capacity = 64
            max_frame_size = 4096
            idle_timeout_secs = 30

            [crypto]
            rsa_bits = 3072
            session_key_size = 16

            [client]
            server_url = "ws://relay.example:9000/chat"
            key_file = "/tmp/identity.json"

            [logging]
            level = "debug"
        "#;

        let config = NodeConfig::from_str(toml).unwrap();
        assert_eq!(config.network.listen_addr.port(), 9000);
        assert_eq!(config.network.path, "/chat");
        assert_eq!(config.limits.max_connections, 10);
        assert_eq!(config.limits.max_frame_size, 4096);
        assert_eq!(config.limits.idle_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.crypto.session_key_size, 16);
        assert_eq!(config.client.key_file, Some(PathBuf::from("/tmp/identity.json")));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = NodeConfig::from_str("[limits]\nmax_connections = 5\n").unwrap();
        assert_eq!(config.limits.max_connections, 5);
        assert_eq!(config.limits.outbound_queue_capacity, 256);
        assert_eq!(config.network.path, "/ws");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            ("[network]\npath = \"ws\"\n", "network.path"),
            ("[limits]\nmax_connections = 0\n", "limits.max_connections"),
            ("[limits]\noutbound_queue_capacity = 0\n", "limits.outbound_queue_capacity"),
            ("[limits]\nmax_frame_size = 0\n", "limits.max_frame_size"),
            ("[crypto]\nrsa_bits = 512\n", "crypto.rsa_bits"),
            ("[crypto]\nrsa_bits = 2050\n", "crypto.rsa_bits"),
            ("[crypto]\nsession_key_size = 20\n", "crypto.session_key_size"),
            ("[client]\nserver_url = \"http://x\"\n", "client.server_url"),
        ];

        for (toml, field) in cases {
            match NodeConfig::from_str(toml) {
                Err(NodeError::ConfigInvalid { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected ConfigInvalid for {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_toml_round_trip() {
        let config = NodeConfig::default();
        let parsed = NodeConfig::from_str(&config.to_toml()).unwrap();
        assert_eq!(parsed.network.listen_addr, config.network.listen_addr);
        assert_eq!(parsed.client.server_url, config.client.server_url);
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let config = NodeConfig::load_or_default("/nonexistent/shadowchat.toml")
            .await
            .unwrap();
        assert_eq!(config.network.path, "/ws");

        let err = NodeConfig::load("/nonexistent/shadowchat.toml").await.unwrap_err();
        assert!(err.is_config_error());
    }
}
