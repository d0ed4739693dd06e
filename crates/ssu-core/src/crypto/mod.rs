// ============================================
// File: crates/ssu-core/src/crypto/mod.rs
// ============================================
//! # Cryptography Module
//!
//! ## Creation Reason
//! Collects every cryptographic building block of the SSU handshake and
//! datagram layer, all on audited RustCrypto / dalek implementations.
//!
//! ## Submodules
//! - [`dh`]: ephemeral 2048-bit MODP (group 14) Diffie-Hellman
//! - [`kdf`]: session/MAC key derivation from the raw DH secret
//! - [`keys`]: `SessionKeys`, `IntroKey`, Ed25519 identity keys
//! - [`transport`]: the MAC-then-decrypt datagram codec
//! - [`handshake`]: signed-hash construction and signing capabilities
//!
//! ## Cryptographic Design
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Handshake Phase                          │
//! │  Initiator                                   Responder      │
//! │    │  SessionRequest(X, ip)  [intro key] ──────────► │      │
//! │    │ ◄────────── SessionCreated(Y, addr, tag, sig)   │      │
//! │    │                           [intro key]           │      │
//! │    │  DH group 14 ──► secret ──► derive_session_keys │      │
//! │    │  SessionConfirmed  [session keys] ────────────► │      │
//! └─────────────────────────────────────────────────────────────┘
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Data Phase                               │
//! │   MAC(16) ‖ IV(16) ‖ AES-128-CBC(flag ‖ time ‖ data ‖ pad)  │
//! │   MAC = HMAC-MD5(mac key, ciphertext ‖ IV ‖ u16 length)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALL secret key types implement Zeroize and redact their Debug output
//! - MAC is always verified before any decryption happens
//!
//! ## Last Modified
//! v0.1.0 - Initial crypto implementation

pub mod dh;
pub mod handshake;
pub mod kdf;
pub mod keys;
pub mod transport;

pub use dh::{DhKeyPair, SharedSecret};
pub use handshake::{Ed25519Verifier, HandshakeSigner, HandshakeVerifier};
pub use keys::{FramingKeys, IdentityKeyPair, IdentityPublicKey, IntroKey, SessionKeys};
pub use transport::DatagramCodec;

// ============================================
// Constants
// ============================================

/// Size of a group-14 public value on the wire.
pub const DH_PUBLIC_SIZE: usize = 256;

/// Size of each derived session key.
pub const SESSION_KEY_SIZE: usize = 32;

/// Size of the HMAC-MD5 key.
pub const MAC_KEY_SIZE: usize = 32;

/// AES-128 key size; the first bytes of the 32-byte encryption key.
pub const CIPHER_KEY_SIZE: usize = 16;

/// AES block and IV size.
pub const BLOCK_SIZE: usize = 16;

/// Size of the HMAC-MD5 tag.
pub const MAC_SIZE: usize = 16;

/// Size of the pre-shared introduction key.
pub const INTRO_KEY_SIZE: usize = 32;

/// Size of Ed25519 public key in bytes.
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Size of Ed25519 signature in bytes.
pub const ED25519_SIGNATURE_SIZE: usize = 64;
