// ============================================
// File: crates/ssu-node/src/handlers/mod.rs
// ============================================
//! # Async Handlers
//!
//! ## Creation Reason
//! Async glue between the sans-IO services and the endpoint.
//!
//! ### Submodules
//! - [`handshake`]: drives a `HandshakeSession` to completion
//!
//! ## Last Modified
//! v0.1.0 - Initial handlers structure

pub mod handshake;

pub use handshake::drive;

use tokio::time::Instant;

/// Sleeps until `at`, or forever when there is no deadline.
pub(crate) async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
