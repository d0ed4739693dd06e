// ============================================
// File: crates/ssu-transport/src/lib.rs
// ============================================
//! # SSU Transport - Datagram I/O Layer
//!
//! ## Creation Reason
//! Unreliable datagram transports for the SSU stack, behind one trait so
//! the endpoint runs over real UDP in production and in memory in tests.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`traits`]: the `Transport` trait
//! - [`udp`]: Tokio UDP socket implementation
//! - [`memory`]: in-memory network for tests
//! - [`error`]: transport-specific error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  ssu-node                           │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │     ssu-core            ssu-transport               │
//! │         │               You are here ◄──            │
//! │         ▼                                           │
//! │     ssu-common                                      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Always code against the `Transport` trait for testability
//! - Transports know nothing about SSU framing; they move opaque bytes
//! - No dependency on `ssu-common`; keep it a plain datagram layer
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod memory;
pub mod traits;
pub mod udp;

pub use error::{Result, TransportError};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use traits::Transport;
pub use udp::{UdpOptions, UdpTransport};
