// ============================================
// File: crates/ssu-core/src/lib.rs
// ============================================
//! # SSU Core - Wire Formats & Cryptography
//!
//! ## Creation Reason
//! Pure, IO-free building blocks of the SSU transport: the authenticated
//! datagram codec, key derivation, group-14 Diffie-Hellman and the
//! handshake message formats.
//!
//! ## Main Functionality
//!
//! ### Protocol Module ([`protocol`])
//! - Flag byte codec and payload types
//! - SessionRequest / SessionCreated encoding
//! - SessionConfirmed extension point (`ConfirmationCodec`)
//!
//! ### Crypto Module ([`crypto`])
//! - `DatagramCodec`: AES-128-CBC + HMAC-MD5 framing
//! - `kdf`: session and MAC keys from the DH secret
//! - `DhKeyPair`: ephemeral 2048-bit MODP exchange
//! - Signing capabilities for SessionCreated
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  ssu-node                           │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │     ssu-core            ssu-transport               │
//! │   You are here                │                     │
//! │         │                     │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │               ssu-common                            │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Everything here is a pure function of its inputs plus `OsRng`
//! - ALL secret key types implement Zeroize
//! - Wire layouts are fixed by interoperating peers; do not "improve" them
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod crypto;
pub mod error;
pub mod protocol;

pub use crypto::{
    DatagramCodec, DhKeyPair, Ed25519Verifier, FramingKeys, HandshakeSigner, HandshakeVerifier,
    IdentityKeyPair, IdentityPublicKey, IntroKey, SessionKeys,
};
pub use error::{CoreError, Result};
pub use protocol::{
    ConfirmationCodec, ConfirmationContext, Flag, HandshakeCodec, HandshakeMessage, PayloadType,
    SessionCreated, SessionRequest, UnimplementedConfirmation, WireAddress,
};
