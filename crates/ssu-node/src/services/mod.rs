// ============================================
// File: crates/ssu-node/src/services/mod.rs
// ============================================
//! # Session Services
//!
//! ## Creation Reason
//! Protocol logic for one peer, kept apart from the endpoint and the
//! async drivers.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`handshake`]: sans-IO handshake state machine
//! - [`connection`]: established session read/write/close
//!
//! ## Service Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Service Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌──────────────────┐  Established  ┌─────────────────────┐ │
//! │  │ HandshakeSession │──────────────►│ SessionConnection   │ │
//! │  │  - Intro key     │  (keys, peer, │  - Data datagrams   │ │
//! │  │  - DH exchange   │   relay tag)  │  - Deadlines        │ │
//! │  │  - Retransmit    │               │  - Close / zeroize  │ │
//! │  └──────────────────┘               └─────────────────────┘ │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - `HandshakeSession` never touches a socket; the driver in
//!   `handlers::handshake` does all I/O for it
//! - Key material moves, it is never cloned out of a session
//!
//! ## Last Modified
//! v0.1.0 - Initial services structure

pub mod connection;
pub mod handshake;

pub use connection::SessionConnection;
pub use handshake::{
    Established, HandshakeSession, HandshakeState, PendingConfirmation, Role, Step,
};
