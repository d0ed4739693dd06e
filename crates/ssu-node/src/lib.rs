// ============================================
// File: crates/ssu-node/src/lib.rs
// ============================================
//! # SSU Node Library
//!
//! ## Creation Reason
//! Turns the sans-IO protocol core into something that talks over a
//! socket: handshake sessions, their async driver, a demultiplexing
//! endpoint and the dial/listen entry points.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: TOML node configuration
//! - [`endpoint`]: one transport, many peers
//! - [`services`]: protocol logic
//!   - [`services::handshake`]: handshake state machine
//!   - [`services::connection`]: established sessions
//! - [`handlers`]: async drivers for the services
//! - [`dialer`]: initiator entry point
//! - [`listener`]: responder entry point
//! - [`error`]: node error types
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           SSU Node                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────┐                            ┌─────────────────┐ │
//! │  │   Dialer    │──┐                      ┌─►│SessionConnection│ │
//! │  └─────────────┘  │   ┌──────────────┐   │  └─────────────────┘ │
//! │                   ├──►│  Handshake   │───┤                      │
//! │  ┌─────────────┐  │   │  driver +    │   │                      │
//! │  │  Listener   │──┘   │  session     │   │                      │
//! │  └─────────────┘      └──────┬───────┘   │                      │
//! │                              │           │                      │
//! ├──────────────────────────────┼───────────┼──────────────────────┤
//! │                      Endpoint (route per source address)        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │            Transport (UdpTransport / MemoryTransport)           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - SessionConfirmed has no built-in layout; install a
//!   `ConfirmationCodec` on both dialer and listener or every handshake
//!   fails with `Unimplemented`
//! - Data delivery is semi-reliable; nothing is acknowledged
//!
//! ## Last Modified
//! v0.1.0 - Initial node library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dialer;
pub mod endpoint;
pub mod error;
pub mod handlers;
pub mod listener;
pub mod services;

// Re-export primary types
pub use config::{HandshakeConfig, NodeConfig};
pub use dialer::{Dialer, RemotePeer};
pub use endpoint::Endpoint;
pub use error::{NodeError, Result};
pub use listener::{Listener, ListenerOptions};
pub use services::{HandshakeState, Role, SessionConnection};
