// ============================================
// File: crates/ssu-node/src/error.rs
// ============================================
//! # Node Error Types
//!
//! ## Creation Reason
//! Errors surfaced by the endpoint, dialer, listener and established
//! connections, plus configuration loading.
//!
//! ## ⚠️ Important Note for Next Developer
//! - A failed handshake is reported once, as `Handshake { state, reason }`
//! - Per-datagram failures never reach callers; they are dropped inside
//!   the handshake driver or the connection read loop
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::net::SocketAddr;

use thiserror::Error;

use ssu_core::error::CoreError;
use ssu_transport::error::TransportError;

use crate::services::handshake::HandshakeState;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;

/// Node error types.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Configuration file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        /// File path
        path: String,
        /// Why loading failed
        reason: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        /// Dotted field name
        field: String,
        /// Why it is invalid
        reason: String,
    },

    /// Handshake ended in `Failed`.
    #[error("Handshake with {peer} failed in state {state}: {reason}")]
    Handshake {
        /// Remote peer
        peer: SocketAddr,
        /// State the machine was in when it failed
        state: HandshakeState,
        /// Underlying cause
        reason: String,
    },

    /// Handshake retries exhausted, overall timeout or cancellation.
    #[error("Handshake with {peer} timed out")]
    HandshakeTimeout {
        /// Remote peer
        peer: SocketAddr,
    },

    /// Read or write deadline expired.
    #[error("Operation timed out: {operation}")]
    Timeout {
        /// What timed out
        operation: &'static str,
    },

    /// Operation on a closed connection or listener.
    #[error("Connection closed")]
    Closed,

    /// Requested feature is not supported (e.g. relay introduction).
    #[error("Unsupported: {what}")]
    Unsupported {
        /// What is unsupported
        what: String,
    },

    /// Too many handshakes pending on one endpoint.
    #[error("Pending handshake limit reached: max {limit}")]
    PendingLimit {
        /// Configured limit
        limit: usize,
    },

    /// A route for this peer already exists on the endpoint.
    #[error("Peer {peer} already has an active session or handshake")]
    PeerBusy {
        /// Remote peer
        peer: SocketAddr,
    },

    /// Endpoint is shutting down.
    #[error("Endpoint is shutting down")]
    ShuttingDown,

    /// Error from core crate.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error from transport crate.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Filesystem or other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// Creates a `ConfigLoad` error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConfigInvalid` error.
    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Handshake` error.
    pub fn handshake(peer: SocketAddr, state: HandshakeState, reason: impl Into<String>) -> Self {
        Self::Handshake {
            peer,
            state,
            reason: reason.into(),
        }
    }

    /// Creates an `Unsupported` error.
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported { what: what.into() }
    }

    /// Returns `true` for configuration errors.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigLoad { .. } | Self::ConfigInvalid { .. })
    }

    /// Returns `true` for timeouts of any kind.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::HandshakeTimeout { .. })
    }

    /// Returns `true` if retrying the operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::HandshakeTimeout { .. } | Self::PendingLimit { .. } | Self::PeerBusy { .. } => {
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NodeError::config_load("/etc/ssu/node.toml", "file not found");
        assert!(err.to_string().contains("/etc/ssu/node.toml"));

        let peer: SocketAddr = "127.0.0.1:8887".parse().unwrap();
        let err = NodeError::handshake(peer, HandshakeState::RequestSent, "bad signature");
        let shown = err.to_string();
        assert!(shown.contains("RequestSent"));
        assert!(shown.contains("bad signature"));
    }

    #[test]
    fn test_error_classification() {
        assert!(NodeError::config_invalid("handshake.max_attempts", "must be > 0").is_config_error());
        let peer: SocketAddr = "127.0.0.1:8887".parse().unwrap();
        assert!(NodeError::HandshakeTimeout { peer }.is_timeout());
        assert!(NodeError::HandshakeTimeout { peer }.is_retryable());
        assert!(NodeError::Timeout { operation: "read" }.is_timeout());
        assert!(!NodeError::Closed.is_retryable());
    }
}
