// ============================================
// File: crates/ssu-node/src/config.rs
// ============================================
//! # Node Configuration
//!
//! ## Creation Reason
//! Configuration for an SSU node: where it listens, how patient its
//! handshakes are, which identity and introduction key it uses.
//!
//! ## Main Functionality
//! - `NodeConfig`: main configuration structure
//! - TOML file loading and parsing
//! - Configuration validation
//! - Typed accessors (durations, decoded intro key)
//!
//! ## Configuration Sections
//! - `network`: UDP listen address
//! - `handshake`: retransmission, timeouts, clock skew, pending limit
//! - `identity`: Ed25519 key file, base64 introduction key
//! - `logging`: log level
//!
//! ## Example Configuration
//! ```toml
//! [network]
//! listen_addr = "0.0.0.0:8887"
//!
//! [handshake]
//! retransmit_interval_ms = 1000
//! max_attempts = 5
//! timeout_secs = 20
//! max_clock_skew_secs = 60
//! max_pending = 256
//! offer_relay_tag = false
//!
//! [identity]
//! key_file = "/etc/ssu/identity.json"
//! intro_key = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8="
//!
//! [logging]
//! level = "info"
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The intro key is optional here because `keygen` and `validate` run
//!   without one; `listen` and `dial` require it
//! - All config changes require a restart
//!
//! ## Last Modified
//! v0.1.0 - Initial configuration implementation

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use ssu_core::crypto::IntroKey;

use crate::error::{NodeError, Result};

/// Log levels accepted in `[logging]`.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ============================================
// NodeConfig
// ============================================

/// Main node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,

    /// Handshake tuning.
    #[serde(default)]
    pub handshake: HandshakeConfig,

    /// Identity and introduction key.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NodeConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// `ConfigLoad` if the file cannot be read or parsed, `ConfigInvalid`
    /// if a value is out of range.
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

    /// Loads configuration from a string.
    ///
    /// # Errors
    /// Same as [`load`](Self::load).
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
    /// `ConfigInvalid` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        self.handshake.validate()?;
        self.identity.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Serializes configuration to a TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Returns the listen address.
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        self.network.listen_addr
    }
}

// ============================================
// NetworkConfig
// ============================================

/// Network configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// UDP listen address. Port 0 picks an ephemeral port.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8887))
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

// ============================================
// HandshakeConfig
// ============================================

/// Handshake tuning section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Delay before an unanswered handshake message is resent.
    pub retransmit_interval_ms: u64,

    /// Sends of one handshake message before giving up, including the first.
    pub max_attempts: u32,

    /// Hard limit on one whole handshake.
    pub timeout_secs: u64,

    /// Largest accepted difference between a datagram timestamp and our clock.
    pub max_clock_skew_secs: u32,

    /// Inbound handshakes an endpoint tracks at once.
    pub max_pending: usize,

    /// Whether a responder hands out nonzero relay tags.
    pub offer_relay_tag: bool,
}

impl HandshakeConfig {
    fn validate(&self) -> Result<()> {
        if self.retransmit_interval_ms == 0 {
            return Err(NodeError::config_invalid(
                "handshake.retransmit_interval_ms",
                "must be greater than 0",
            ));
        }
        if self.max_attempts == 0 {
            return Err(NodeError::config_invalid(
                "handshake.max_attempts",
                "must be greater than 0",
            ));
        }
        if self.timeout_secs == 0 {
            return Err(NodeError::config_invalid(
                "handshake.timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.max_pending == 0 {
            return Err(NodeError::config_invalid(
                "handshake.max_pending",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Retransmission interval as a `Duration`.
    #[must_use]
    pub const fn retransmit_interval(&self) -> Duration {
        Duration::from_millis(self.retransmit_interval_ms)
    }

    /// Overall handshake timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            retransmit_interval_ms: 1000,
            max_attempts: 5,
            timeout_secs: 20,
            max_clock_skew_secs: ssu_common::time::DEFAULT_MAX_CLOCK_SKEW_SECS,
            max_pending: 256,
            offer_relay_tag: false,
        }
    }
}

// ============================================
// IdentityConfig
// ============================================

/// Identity configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Path to the Ed25519 identity key file.
    #[serde(default = "default_key_file")]
    pub key_file: String,

    /// Base64 introduction key shared with peers.
    #[serde(default)]
    pub intro_key: Option<String>,
}

fn default_key_file() -> String {
    "/etc/ssu/identity.json".to_string()
}

impl IdentityConfig {
    fn validate(&self) -> Result<()> {
        if self.key_file.is_empty() {
            return Err(NodeError::config_invalid(
                "identity.key_file",
                "cannot be empty",
            ));
        }
        self.intro_key()?;
        Ok(())
    }

    /// Decodes the configured introduction key, if any.
    ///
    /// # Errors
    /// `ConfigInvalid` if the value is not base64 for 32 bytes.
    pub fn intro_key(&self) -> Result<Option<IntroKey>> {
        self.intro_key
            .as_deref()
            .map(|encoded| {
                IntroKey::from_base64(encoded)
                    .map_err(|e| NodeError::config_invalid("identity.intro_key", e.to_string()))
            })
            .transpose()
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            key_file: default_key_file(),
            intro_key: None,
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

impl LoggingConfig {
    fn validate(&self) -> Result<()> {
        let level = self.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(NodeError::config_invalid(
                "logging.level",
                format!("unknown level '{}'", self.level),
            ));
        }
        Ok(())
    }
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
