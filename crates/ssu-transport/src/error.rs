// ============================================
// File: crates/ssu-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! What can go wrong underneath an SSU endpoint: the UDP socket cannot
//! be set up, a datagram cannot go out or come in, or the transport has
//! already been shut down.
//!
//! ## Error Categories
//! ```text
//! setup      InvalidAddress, AddressInUse, BindFailed, Io (socket options)
//! per-send   SendFailed, DatagramTooLarge      ── the endpoint logs and goes on
//! per-recv   ReceiveFailed                     ── the receive loop keeps running
//! terminal   ShuttingDown                      ── the receive loop exits
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The handshake driver treats `is_retryable` errors as a lost datagram
//!   and leaves recovery to the retransmit timer
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Datagram transport failures.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Socket Setup
    // ========================================
    /// Bind address string does not parse.
    #[error("Invalid socket address: {addr}")]
    InvalidAddress {
        /// The rejected string
        addr: String,
    },

    /// Another socket (or in-memory transport) holds the address.
    #[error("Address {addr} already in use")]
    AddressInUse {
        /// The contested address
        addr: SocketAddr,
    },

    /// The OS refused the bind for any other reason.
    #[error("Failed to bind UDP socket to {addr}: {reason}")]
    BindFailed {
        /// Requested local address
        addr: SocketAddr,
        /// OS error text
        reason: String,
    },

    /// A socket option or conversion failed while setting up.
    #[error("UDP socket setup failed while {context}")]
    Io {
        /// Setup step that failed
        context: &'static str,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    // ========================================
    // Datagram I/O
    // ========================================
    /// The socket rejected an outgoing datagram.
    #[error("Failed to send datagram to {dest}: {reason}")]
    SendFailed {
        /// Peer address
        dest: SocketAddr,
        /// OS error text
        reason: String,
    },

    /// The socket reported an error instead of a datagram.
    #[error("Failed to receive datagram: {reason}")]
    ReceiveFailed {
        /// OS error text
        reason: String,
    },

    /// Datagram larger than one UDP payload.
    #[error("Datagram of {size} bytes exceeds the {max}-byte limit")]
    DatagramTooLarge {
        /// Attempted size
        size: usize,
        /// Transport limit
        max: usize,
    },

    // ========================================
    // Lifecycle
    // ========================================
    /// The transport was shut down.
    #[error("Transport is shutting down")]
    ShuttingDown,
}

impl TransportError {
    /// Creates a `BindFailed` error.
    pub fn bind_failed(addr: SocketAddr, reason: impl Into<String>) -> Self {
        Self::BindFailed {
            addr,
            reason: reason.into(),
        }
    }

    /// Creates a `SendFailed` error.
    pub fn send_failed(dest: SocketAddr, reason: impl Into<String>) -> Self {
        Self::SendFailed {
            dest,
            reason: reason.into(),
        }
    }

    /// Creates an `Io` error for a setup step.
    #[must_use]
    pub const fn io(context: &'static str, source: io::Error) -> Self {
        Self::Io { context, source }
    }

    /// Returns `true` when only this datagram was affected.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::SendFailed { .. } | Self::ReceiveFailed { .. })
    }

    /// Returns `true` once the transport can no longer be used.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::ShuttingDown)
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::bind_failed("127.0.0.1:8887".parse().unwrap(), "permission denied");
        assert!(err.to_string().contains("127.0.0.1:8887"));
        assert!(err.to_string().contains("permission denied"));

        let err = TransportError::io("setting SO_RCVBUF", io::Error::other("nope"));
        assert_eq!(err.to_string(), "UDP socket setup failed while setting SO_RCVBUF");
    }

    #[test]
    fn test_only_per_datagram_errors_are_retryable() {
        let dest = "127.0.0.1:8887".parse().unwrap();
        assert!(TransportError::send_failed(dest, "unreachable").is_retryable());
        assert!(TransportError::ReceiveFailed { reason: "reset".into() }.is_retryable());

        assert!(!TransportError::DatagramTooLarge { size: 70_000, max: 65_507 }.is_retryable());
        assert!(!TransportError::AddressInUse { addr: dest }.is_retryable());
        assert!(!TransportError::ShuttingDown.is_retryable());
        assert!(TransportError::ShuttingDown.is_closed());
    }
}
