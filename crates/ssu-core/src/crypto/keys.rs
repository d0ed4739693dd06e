// ============================================
// File: crates/ssu-core/src/crypto/keys.rs
// ============================================
//! # Cryptographic Key Types
//!
//! ## Creation Reason
//! Key material handled by the SSU layer, with Zeroize on drop,
//! redacted `Debug` output and constant-time comparison.
//!
//! ## Main Functionality
//! - `FramingKeys`: the (MAC key, cipher key) pair a datagram is sealed with
//! - `IntroKey`: pre-shared 32-byte key protecting handshake datagrams
//! - `SessionKeys`: DH-derived encryption and MAC keys
//! - `IdentityKeyPair` / `IdentityPublicKey`: long-term Ed25519 identity
//!
//! ## Key Lifecycle
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  IntroKey (long-lived, pre-shared)                         │
//! │  └─ Frames SessionRequest / SessionCreated                 │
//! │                                                            │
//! │  DhKeyPair (per handshake attempt, see dh.rs)              │
//! │  └─ Consumed by the exchange                               │
//! │                                                            │
//! │  SessionKeys (per session)                                 │
//! │  ├─ Frames SessionConfirmed and all Data datagrams         │
//! │  └─ Zeroized when the connection closes                    │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The cipher is AES-128: only the first 16 bytes of a 32-byte
//!   encryption key (or intro key) key the block cipher
//! - Private keys should NEVER be logged or serialized carelessly
//!
//! ## Last Modified
//! v0.1.0 - Initial key type definitions

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{
    CIPHER_KEY_SIZE, ED25519_PUBLIC_KEY_SIZE, ED25519_SIGNATURE_SIZE, INTRO_KEY_SIZE,
    MAC_KEY_SIZE, SESSION_KEY_SIZE,
};
use crate::error::{CoreError, Result};

// ============================================
// FramingKeys
// ============================================

/// Keys a datagram is sealed and opened with.
///
/// Implemented by [`IntroKey`] (handshake) and [`SessionKeys`] (after the
/// handshake), so the codec does not care which phase it is in.
pub trait FramingKeys {
    /// 32-byte HMAC-MD5 key.
    fn mac_key(&self) -> &[u8; MAC_KEY_SIZE];

    /// AES-128 key: the leading `CIPHER_KEY_SIZE` bytes of a 32-byte key.
    fn cipher_key(&self) -> &[u8];
}

// ============================================
// IntroKey
// ============================================

/// Pre-shared introduction key of a responder.
///
/// Published out of band with the responder's address. Both handshake
/// directions are framed with the *responder's* intro key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct IntroKey([u8; INTRO_KEY_SIZE]);

impl IntroKey {
    /// Wraps raw key bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; INTRO_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds an intro key from a slice.
    ///
    /// # Errors
    /// `InvalidKeyMaterial` if the slice is not 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; INTRO_KEY_SIZE] = bytes.try_into().map_err(|_| {
            CoreError::invalid_key(format!(
                "intro key must be {INTRO_KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Generates a fresh random intro key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; INTRO_KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parses the base64 form used in configuration files.
    ///
    /// # Errors
    /// Decoding or length errors.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = zeroize::Zeroizing::new(
            BASE64
                .decode(encoded.trim())
                .map_err(|e| ssu_common::CommonError::decoding("intro key", e))?,
        );
        Self::from_slice(&bytes)
    }

    /// Base64 form for configuration files.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; INTRO_KEY_SIZE] {
        &self.0
    }
}

impl FramingKeys for IntroKey {
    fn mac_key(&self) -> &[u8; MAC_KEY_SIZE] {
        &self.0
    }

    fn cipher_key(&self) -> &[u8] {
        &self.0[..CIPHER_KEY_SIZE]
    }
}

impl fmt::Debug for IntroKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntroKey([REDACTED])")
    }
}

impl PartialEq for IntroKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for IntroKey {}

// ============================================
// SessionKeys
// ============================================

/// Encryption and MAC keys derived from the DH shared secret.
///
/// # Security
/// - Zeroed on drop
/// - Never logged or serialized
/// - Constant-time comparison
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    encryption: [u8; SESSION_KEY_SIZE],
    mac: [u8; MAC_KEY_SIZE],
}

impl SessionKeys {
    /// Creates session keys from raw bytes.
    #[must_use]
    pub const fn new(encryption: [u8; SESSION_KEY_SIZE], mac: [u8; MAC_KEY_SIZE]) -> Self {
        Self { encryption, mac }
    }

    /// Full 32-byte encryption key.
    #[must_use]
    pub const fn encryption_key(&self) -> &[u8; SESSION_KEY_SIZE] {
        &self.encryption
    }
}

impl FramingKeys for SessionKeys {
    fn mac_key(&self) -> &[u8; MAC_KEY_SIZE] {
        &self.mac
    }

    fn cipher_key(&self) -> &[u8] {
        &self.encryption[..CIPHER_KEY_SIZE]
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKeys([REDACTED])")
    }
}

impl PartialEq for SessionKeys {
    fn eq(&self, other: &Self) -> bool {
        let enc = self.encryption.ct_eq(&other.encryption);
        let mac = self.mac.ct_eq(&other.mac);
        (enc & mac).into()
    }
}

impl Eq for SessionKeys {}

// ============================================
// IdentityKeyPair (Ed25519)
// ============================================

/// Long-term Ed25519 identity used to sign SessionCreated.
///
/// # Example
/// ```
/// use ssu_core::crypto::IdentityKeyPair;
///
/// let identity = IdentityKeyPair::generate();
/// let signature = identity.sign(b"hash");
/// assert!(identity.public_key().verify(b"hash", &signature).is_ok());
/// ```
pub struct IdentityKeyPair {
    signing_key: SigningKey,
}

impl IdentityKeyPair {
    /// Generates a new identity from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Restores an identity from its 32-byte seed.
    ///
    /// # Errors
    /// `InvalidKeyMaterial` if `bytes` is not 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut seed: [u8; 32] = bytes.try_into().map_err(|_| {
            CoreError::invalid_key(format!(
                "Ed25519 seed must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();
        Ok(Self { signing_key })
    }

    /// Returns the public half.
    #[must_use]
    pub fn public_key(&self) -> IdentityPublicKey {
        IdentityPublicKey(self.signing_key.verifying_key())
    }

    /// Raw public key bytes.
    #[must_use]
    pub fn public_key_bytes(&self) -> [u8; ED25519_PUBLIC_KEY_SIZE] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Signs `message`.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> [u8; ED25519_SIGNATURE_SIZE] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Exports the 32-byte seed for the key file.
    ///
    /// # Security Warning
    /// Zero the returned bytes once written.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

// ============================================
// IdentityPublicKey
// ============================================

/// Public half of an Ed25519 identity. Base64 in human-readable formats.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct IdentityPublicKey(VerifyingKey);

impl IdentityPublicKey {
    /// Parses a public key from a slice.
    ///
    /// # Errors
    /// `InvalidKeyMaterial` for a wrong length or an invalid point.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; ED25519_PUBLIC_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CoreError::invalid_key("Ed25519 public key must be 32 bytes"))?;
        let key = VerifyingKey::from_bytes(&arr)
            .map_err(|_| CoreError::invalid_key("invalid Ed25519 public key"))?;
        Ok(Self(key))
    }

    /// Parses the base64 form.
    ///
    /// # Errors
    /// Decoding or key errors.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| ssu_common::CommonError::decoding("identity key", e))?;
        Self::from_slice(&bytes)
    }

    /// Raw public key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ED25519_PUBLIC_KEY_SIZE] {
        self.0.as_bytes()
    }

    /// Verifies `signature` over `message`.
    ///
    /// # Errors
    /// `SignatureVerification` on any failure, including a malformed signature.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let sig = Signature::from_slice(signature).map_err(|_| CoreError::SignatureVerification)?;
        self.0
            .verify(message, &sig)
            .map_err(|_| CoreError::SignatureVerification)
    }
}

impl fmt::Debug for IdentityPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.as_bytes();
        write!(
            f,
            "IdentityPublicKey({:02x}{:02x}{:02x}{:02x}...)",
            bytes[0], bytes[1], bytes[2], bytes[3]
        )
    }
}

impl fmt::Display for IdentityPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", BASE64.encode(self.0.as_bytes()))
    }
}

impl Serialize for IdentityPublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&BASE64.encode(self.0.as_bytes()))
        } else {
            serializer.serialize_bytes(self.0.as_bytes())
        }
    }
}

impl<'de> Deserialize<'de> for IdentityPublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_base64(&s).map_err(serde::de::Error::custom)
        } else {
            let bytes = <Vec<u8>>::deserialize(deserializer)?;
            Self::from_slice(&bytes).map_err(serde::de::Error::custom)
        }
    }
}

// ============================================
// Tests
// ============================================
