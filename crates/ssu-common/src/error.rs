// ============================================
// File: crates/ssu-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Intro keys and identity keys travel out of band as base64 text, in
//! config files and on the command line. Decoding that text is the one
//! failure every crate above shares, so it lives here and the crate
//! errors (`CoreError`, `NodeError`) wrap it transparently.
//!
//! ## Main Functionality
//! - `CommonError::Decoding`: text that is not valid base64
//! - `Result<T>`: alias over `CommonError`
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never echo the offending text in the message; it may be a private key
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::fmt;

use thiserror::Error;

/// Result alias over [`CommonError`].
pub type Result<T> = std::result::Result<T, CommonError>;

/// Failures shared across the SSU crates.
///
/// # Example
/// ```
/// use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
/// use ssu_common::CommonError;
///
/// let err = BASE64
///     .decode("not base64!")
///     .map_err(|e| CommonError::decoding("intro key", e))
///     .unwrap_err();
/// assert!(err.to_string().contains("intro key"));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Key text that does not decode.
    #[error("Cannot decode {what}: {details}")]
    Decoding {
        /// Which key was being decoded
        what: &'static str,
        /// Decoder message (never the input itself)
        details: String,
    },
}

impl CommonError {
    /// Creates a `Decoding` error for the key named `what`.
    pub fn decoding(what: &'static str, details: impl fmt::Display) -> Self {
        Self::Decoding {
            what,
            details: details.to_string(),
        }
    }
}
