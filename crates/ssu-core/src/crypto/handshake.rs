// ============================================
// File: crates/ssu-core/src/crypto/handshake.rs
// ============================================
//! # Handshake Cryptography
//!
//! ## Creation Reason
//! The responder proves its identity by signing a hash over both DH
//! public values and both endpoint addresses. Signing and verification
//! are capabilities injected by the caller so the state machine does not
//! depend on one signature scheme.
//!
//! ## Main Functionality
//! - `session_created_hash`: SHA-1 over the SessionCreated binding fields
//! - `HandshakeSigner`: produces the responder signature
//! - `HandshakeVerifier`: checks it on the initiator side
//! - `Ed25519Verifier`: default verifier for an expected responder identity
//!
//! ## Signed Data Layout
//! ```text
//! SHA-1( X(256) ‖ Y(256)
//!      ‖ requester IP ‖ requester port(2)
//!      ‖ responder IP ‖ responder port(2)
//!      ‖ relay tag(4) ‖ signed-on time(4) )
//! ```
//! "Requester" is the initiator as observed by the responder.
//! "Responder" is the address the initiator sent its request to.
//!
//! ## ⚠️ Important Note for Next Developer
//! - Both sides must feed byte-identical addresses or the signature fails
//! - IPv4 contributes 4 bytes, IPv6 16 bytes
//!
//! ## Last Modified
//! v0.1.0 - Initial signed-hash construction

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use sha1::{Digest, Sha1};
use ssu_common::Timestamp;

use super::keys::{IdentityKeyPair, IdentityPublicKey};
use super::{DH_PUBLIC_SIZE, ED25519_SIGNATURE_SIZE};
use crate::error::{CoreError, Result};

/// SHA-1 output size.
pub const SIGNED_HASH_SIZE: usize = 20;

// ============================================
// Signed Hash
// ============================================

fn update_addr(hasher: &mut Sha1, addr: &SocketAddr) {
    match addr.ip() {
        IpAddr::V4(ip) => hasher.update(ip.octets()),
        IpAddr::V6(ip) => hasher.update(ip.octets()),
    }
    hasher.update(addr.port().to_be_bytes());
}

/// Computes the hash the responder signs in SessionCreated.
#[must_use]
pub fn session_created_hash(
    x: &[u8; DH_PUBLIC_SIZE],
    y: &[u8; DH_PUBLIC_SIZE],
    requester: &SocketAddr,
    responder: &SocketAddr,
    relay_tag: u32,
    signed_on: Timestamp,
) -> [u8; SIGNED_HASH_SIZE] {
    let mut hasher = Sha1::new();
    hasher.update(x);
    hasher.update(y);
    update_addr(&mut hasher, requester);
    update_addr(&mut hasher, responder);
    hasher.update(relay_tag.to_be_bytes());
    hasher.update(signed_on.to_be_bytes());
    let mut out = [0u8; SIGNED_HASH_SIZE];
    out.copy_from_slice(&hasher.finalize());
    out
}

// ============================================
// Capabilities
// ============================================

/// Signing capability of a responder.
pub trait HandshakeSigner: Send + Sync {
    /// Length of every signature this signer produces.
    fn signature_len(&self) -> usize;

    /// Signs the SessionCreated hash.
    ///
    /// # Errors
    /// `SignatureCreation` if the backend cannot sign.
    fn sign(&self, hash: &[u8]) -> Result<Vec<u8>>;
}

/// Verification capability of an initiator, bound to the responder
/// identity it expects.
pub trait HandshakeVerifier: Send + Sync {
    /// Expected signature length, used to decode SessionCreated.
    fn signature_len(&self) -> usize;

    /// Verifies `signature` over `hash`.
    ///
    /// # Errors
    /// `SignatureVerification` on mismatch.
    fn verify(&self, hash: &[u8], signature: &[u8]) -> Result<()>;
}

impl HandshakeSigner for IdentityKeyPair {
    fn signature_len(&self) -> usize {
        ED25519_SIGNATURE_SIZE
    }

    fn sign(&self, hash: &[u8]) -> Result<Vec<u8>> {
        Ok(IdentityKeyPair::sign(self, hash).to_vec())
    }
}

impl<T: HandshakeSigner + ?Sized> HandshakeSigner for Arc<T> {
    fn signature_len(&self) -> usize {
        (**self).signature_len()
    }

    fn sign(&self, hash: &[u8]) -> Result<Vec<u8>> {
        (**self).sign(hash)
    }
}

/// Verifies Ed25519 signatures from one responder identity.
#[derive(Debug, Clone, Copy)]
pub struct Ed25519Verifier {
    responder: IdentityPublicKey,
}

impl Ed25519Verifier {
    /// Creates a verifier for `responder`.
    #[must_use]
    pub const fn new(responder: IdentityPublicKey) -> Self {
        Self { responder }
    }

    /// The identity this verifier accepts.
    #[must_use]
    pub const fn responder(&self) -> &IdentityPublicKey {
        &self.responder
    }
}

impl HandshakeVerifier for Ed25519Verifier {
    fn signature_len(&self) -> usize {
        ED25519_SIGNATURE_SIZE
    }

    fn verify(&self, hash: &[u8], signature: &[u8]) -> Result<()> {
        if signature.len() != ED25519_SIGNATURE_SIZE {
            return Err(CoreError::SignatureVerification);
        }
        self.responder.verify(hash, signature)
    }
}

impl<T: HandshakeVerifier + ?Sized> HandshakeVerifier for Arc<T> {
    fn signature_len(&self) -> usize {
        (**self).signature_len()
    }

    fn verify(&self, hash: &[u8], signature: &[u8]) -> Result<()> {
        (**self).verify(hash, signature)
    }
}

// ============================================
// Tests
// ============================================
