// ============================================
// File: crates/ssu-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Creation Reason
//! Wire formats of the SSU handshake: the flag byte that opens every
//! datagram and the three handshake payloads.
//!
//! ## Submodules
//! - [`flag`]: flag byte packing and the payload type enumeration
//! - [`messages`]: SessionRequest / SessionCreated structures
//! - [`codec`]: binary encoding plus the SessionConfirmed extension point
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Handshake Phase                          │
//! │  Initiator ── SessionRequest   (intro key) ──► Responder    │
//! │  Initiator ◄─ SessionCreated   (intro key) ─── Responder    │
//! │  Initiator ── SessionConfirmed (session keys) ► Responder   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    Data Phase                               │
//! │  Initiator ══════ Data (session keys) ═════════ Responder   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Big-endian byte order for every multi-byte integer
//! - Receivers ignore bytes after the last field of a message
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod codec;
pub mod flag;
pub mod messages;

pub use codec::{
    Codec, ConfirmationCodec, ConfirmationContext, HandshakeCodec, UnimplementedConfirmation,
};
pub use flag::{Flag, PayloadType};
pub use messages::{HandshakeMessage, SessionCreated, SessionRequest, WireAddress};
