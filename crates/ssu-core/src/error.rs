// ============================================
// File: crates/ssu-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Error taxonomy for the datagram codec, key derivation, handshake
//! messages and handshake cryptography.
//!
//! ## Error Categories
//! 1. **Input**: empty key material, bad addresses, oversize payloads
//! 2. **Wire**: truncated datagrams or messages, inconsistent length markers
//! 3. **Crypto**: MAC mismatch, bad key lengths, DH or signature failures
//! 4. **Protocol**: message arrives in a state that does not expect it,
//!    or relies on an extension that is not installed
//!
//! ## Propagation Policy
//! During a handshake or an established session, errors for which
//! [`CoreError::is_discardable`] is `true` are dropped silently by the
//! caller. Everything else terminates the current attempt.
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include key material in error messages
//! - `AuthenticationFailed` deliberately carries no detail
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use ssu_common::error::CommonError;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for wire formats and cryptography.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Input Errors
    // ========================================
    /// Empty or otherwise unusable input (e.g. a zero-length DH secret).
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput {
        /// Which input was rejected
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// Address field cannot be marshalled (IP must be 4 or 16 bytes).
    #[error("Invalid address: {reason}")]
    InvalidAddress {
        /// What is wrong with the address
        reason: String,
    },

    /// Port does not fit the 16-bit wire field.
    #[error("Port {port} does not fit in 16 bits")]
    PortOverflow {
        /// The offending port value
        port: u32,
    },

    /// Datagram payload exceeds the protocol maximum.
    #[error("Payload too large: max {max} bytes, got {actual}")]
    PayloadTooLarge {
        /// Maximum allowed payload
        max: usize,
        /// Actual payload size
        actual: usize,
    },

    // ========================================
    // Wire Errors
    // ========================================
    /// Datagram is too short or its length is not block aligned.
    #[error("Malformed datagram: {reason}")]
    MalformedDatagram {
        /// What is wrong with the datagram
        reason: String,
    },

    /// Handshake message is truncated or has inconsistent length markers.
    #[error("Malformed message: {reason}")]
    MalformedMessage {
        /// What is wrong with the message
        reason: String,
    },

    // ========================================
    // Cryptographic Errors
    // ========================================
    /// Datagram MAC did not verify.
    #[error("Datagram authentication failed")]
    AuthenticationFailed,

    /// MAC key, cipher key or IV has the wrong length.
    #[error("Invalid key material: {reason}")]
    InvalidKeyMaterial {
        /// Which key was wrong
        reason: String,
    },

    /// Cipher or MAC construction failed.
    #[error("Crypto error: {context}")]
    Crypto {
        /// What was being attempted
        context: String,
    },

    /// Diffie-Hellman exchange rejected the peer value.
    #[error("Key exchange failed: {reason}")]
    KeyExchange {
        /// Why the exchange failed
        reason: String,
    },

    /// Handshake signature did not verify.
    #[error("Signature verification failed")]
    SignatureVerification,

    /// The signing capability could not produce a signature.
    #[error("Failed to create signature: {reason}")]
    SignatureCreation {
        /// Why signing failed
        reason: String,
    },

    // ========================================
    // Protocol Errors
    // ========================================
    /// Message is valid but not expected in the current state.
    #[error("Protocol error: {reason}")]
    Protocol {
        /// What was unexpected
        reason: String,
    },

    /// A required protocol extension is not installed.
    #[error("Not implemented: {what}")]
    Unimplemented {
        /// Which piece is missing
        what: String,
    },

    /// No reply within the retry limit.
    #[error("Timed out: {operation}")]
    Timeout {
        /// What timed out
        operation: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================
    /// Error from common crate.
    #[error(transparent)]
    Common(#[from] CommonError),
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidAddress` error.
    pub fn invalid_address(reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            reason: reason.into(),
        }
    }

    /// Creates a `MalformedDatagram` error.
    pub fn malformed_datagram(reason: impl Into<String>) -> Self {
        Self::MalformedDatagram {
            reason: reason.into(),
        }
    }

    /// Creates a `MalformedMessage` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidKeyMaterial` error.
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKeyMaterial {
            reason: reason.into(),
        }
    }

    /// Creates a `Crypto` error.
    pub fn crypto(context: impl Into<String>) -> Self {
        Self::Crypto {
            context: context.into(),
        }
    }

    /// Creates a `KeyExchange` error.
    pub fn key_exchange(reason: impl Into<String>) -> Self {
        Self::KeyExchange {
            reason: reason.into(),
        }
    }

    /// Creates a `Protocol` error.
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Creates an `Unimplemented` error.
    pub fn unimplemented(what: impl Into<String>) -> Self {
        Self::Unimplemented { what: what.into() }
    }

    /// Creates a `Timeout` error.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` for cryptographic failures.
    #[must_use]
    pub const fn is_crypto_error(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed
                | Self::InvalidKeyMaterial { .. }
                | Self::Crypto { .. }
                | Self::KeyExchange { .. }
                | Self::SignatureVerification
                | Self::SignatureCreation { .. }
        )
    }

    /// Returns `true` for wire and sequencing failures.
    #[must_use]
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedDatagram { .. }
                | Self::MalformedMessage { .. }
                | Self::Protocol { .. }
                | Self::Unimplemented { .. }
        )
    }

    /// Returns `true` if a single inbound datagram producing this error
    /// should be dropped without affecting the session.
    #[must_use]
    pub const fn is_discardable(&self) -> bool {
        matches!(
            self,
            Self::MalformedDatagram { .. }
                | Self::MalformedMessage { .. }
                | Self::AuthenticationFailed
                | Self::InvalidAddress { .. }
                | Self::PortOverflow { .. }
        )
    }

    /// Returns `true` if this error might indicate an attack.
    #[must_use]
    pub const fn is_suspicious(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed | Self::SignatureVerification | Self::KeyExchange { .. }
        )
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
        let err = CoreError::PayloadTooLarge {
            max: 32768,
            actual: 40000,
        };
        assert!(err.to_string().contains("32768"));
        assert!(err.to_string().contains("40000"));

        let err = CoreError::PortOverflow { port: 70000 };
        assert!(err.to_string().contains("70000"));
    }

    #[test]
    fn test_error_classification() {
        assert!(CoreError::AuthenticationFailed.is_crypto_error());
        assert!(CoreError::AuthenticationFailed.is_discardable());
        assert!(CoreError::AuthenticationFailed.is_suspicious());

        assert!(CoreError::malformed("short").is_protocol_error());
        assert!(CoreError::malformed("short").is_discardable());

        assert!(!CoreError::SignatureVerification.is_discardable());
        assert!(!CoreError::unimplemented("SessionConfirmed").is_discardable());
        assert!(!CoreError::timeout("handshake").is_discardable());
    }

    #[test]
    fn test_common_error_conversion() {
        let common = CommonError::decoding("intro key", "invalid symbol");
        let core: CoreError = common.into();
        assert!(matches!(core, CoreError::Common(_)));
    }
}
