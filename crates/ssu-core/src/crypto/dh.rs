// ============================================
// File: crates/ssu-core/src/crypto/dh.rs
// ============================================
//! # Ephemeral Diffie-Hellman (MODP Group 14)
//!
//! ## Creation Reason
//! The SSU handshake agrees on session keys with a classic finite-field
//! Diffie-Hellman exchange over the 2048-bit MODP group from RFC 3526,
//! generator 2. Public values travel as fixed 256-byte big-endian fields.
//!
//! ## Main Functionality
//! - `DhKeyPair`: one-shot ephemeral key pair, consumed by `exchange`
//! - `SharedSecret`: raw big-endian secret fed to the KDF
//!
//! ## ⚠️ Important Note for Next Developer
//! - A key pair is used for exactly one handshake attempt
//! - Peer values outside `(1, p-1)` are rejected before exponentiation
//! - The shared secret is the minimal big-endian encoding, so it can be
//!   shorter than 256 bytes; the KDF handles any non-empty length
//!
//! ## Last Modified
//! v0.1.0 - Initial group-14 exchange

use std::fmt;
use std::sync::OnceLock;

use num_bigint::BigUint;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use super::DH_PUBLIC_SIZE;
use crate::error::{CoreError, Result};

// ============================================
// Group Parameters
// ============================================

/// RFC 3526 2048-bit MODP prime.
const GROUP14_PRIME: [u8; DH_PUBLIC_SIZE] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xC9, 0x0F, 0xDA, 0xA2,
    0x21, 0x68, 0xC2, 0x34, 0xC4, 0xC6, 0x62, 0x8B, 0x80, 0xDC, 0x1C, 0xD1,
    0x29, 0x02, 0x4E, 0x08, 0x8A, 0x67, 0xCC, 0x74, 0x02, 0x0B, 0xBE, 0xA6,
    0x3B, 0x13, 0x9B, 0x22, 0x51, 0x4A, 0x08, 0x79, 0x8E, 0x34, 0x04, 0xDD,
    0xEF, 0x95, 0x19, 0xB3, 0xCD, 0x3A, 0x43, 0x1B, 0x30, 0x2B, 0x0A, 0x6D,
    0xF2, 0x5F, 0x14, 0x37, 0x4F, 0xE1, 0x35, 0x6D, 0x6D, 0x51, 0xC2, 0x45,
    0xE4, 0x85, 0xB5, 0x76, 0x62, 0x5E, 0x7E, 0xC6, 0xF4, 0x4C, 0x42, 0xE9,
    0xA6, 0x37, 0xED, 0x6B, 0x0B, 0xFF, 0x5C, 0xB6, 0xF4, 0x06, 0xB7, 0xED,
    0xEE, 0x38, 0x6B, 0xFB, 0x5A, 0x89, 0x9F, 0xA5, 0xAE, 0x9F, 0x24, 0x11,
    0x7C, 0x4B, 0x1F, 0xE6, 0x49, 0x28, 0x66, 0x51, 0xEC, 0xE4, 0x5B, 0x3D,
    0xC2, 0x00, 0x7C, 0xB8, 0xA1, 0x63, 0xBF, 0x05, 0x98, 0xDA, 0x48, 0x36,
    0x1C, 0x55, 0xD3, 0x9A, 0x69, 0x16, 0x3F, 0xA8, 0xFD, 0x24, 0xCF, 0x5F,
    0x83, 0x65, 0x5D, 0x23, 0xDC, 0xA3, 0xAD, 0x96, 0x1C, 0x62, 0xF3, 0x56,
    0x20, 0x85, 0x52, 0xBB, 0x9E, 0xD5, 0x29, 0x07, 0x70, 0x96, 0x96, 0x6D,
    0x67, 0x0C, 0x35, 0x4E, 0x4A, 0xBC, 0x98, 0x04, 0xF1, 0x74, 0x6C, 0x08,
    0xCA, 0x18, 0x21, 0x7C, 0x32, 0x90, 0x5E, 0x46, 0x2E, 0x36, 0xCE, 0x3B,
    0xE3, 0x9E, 0x77, 0x2C, 0x18, 0x0E, 0x86, 0x03, 0x9B, 0x27, 0x83, 0xA2,
    0xEC, 0x07, 0xA2, 0x8F, 0xB5, 0xC5, 0x5D, 0xF0, 0x6F, 0x4C, 0x52, 0xC9,
    0xDE, 0x2B, 0xCB, 0xF6, 0x95, 0x58, 0x17, 0x18, 0x39, 0x95, 0x49, 0x7C,
    0xEA, 0x95, 0x6A, 0xE5, 0x15, 0xD2, 0x26, 0x18, 0x98, 0xFA, 0x05, 0x10,
    0x15, 0x72, 0x8E, 0x5A, 0x8A, 0xAC, 0xAA, 0x68, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF,
];

const GENERATOR: u32 = 2;

fn prime() -> &'static BigUint {
    static PRIME: OnceLock<BigUint> = OnceLock::new();
    PRIME.get_or_init(|| BigUint::from_bytes_be(&GROUP14_PRIME))
}

/// `true` if `1 < value < p - 1`.
fn in_open_range(value: &BigUint) -> bool {
    let one = BigUint::from(1u32);
    let p_minus_one = prime() - &one;
    *value > one && *value < p_minus_one
}

/// Left-pads a big-endian integer into a 256-byte field.
fn to_fixed_be(value: &BigUint) -> [u8; DH_PUBLIC_SIZE] {
    let bytes = value.to_bytes_be();
    let mut out = [0u8; DH_PUBLIC_SIZE];
    out[DH_PUBLIC_SIZE - bytes.len()..].copy_from_slice(&bytes);
    out
}

// ============================================
// DhKeyPair
// ============================================

/// Ephemeral group-14 key pair.
///
/// # Example
/// ```
/// use ssu_core::crypto::DhKeyPair;
///
/// let alice = DhKeyPair::generate();
/// let bob = DhKeyPair::generate();
/// let alice_pub = alice.public_bytes();
/// let bob_pub = bob.public_bytes();
///
/// let s1 = alice.exchange(&bob_pub).unwrap();
/// let s2 = bob.exchange(&alice_pub).unwrap();
/// assert_eq!(s1.as_bytes(), s2.as_bytes());
/// ```
pub struct DhKeyPair {
    private: Zeroizing<Vec<u8>>,
    public: [u8; DH_PUBLIC_SIZE],
}

impl DhKeyPair {
    /// Generates a fresh key pair from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        let p = prime();
        loop {
            let mut raw = Zeroizing::new(vec![0u8; DH_PUBLIC_SIZE]);
            OsRng.fill_bytes(&mut raw);
            let x = BigUint::from_bytes_be(&raw);
            if !in_open_range(&x) {
                continue;
            }
            let public = BigUint::from(GENERATOR).modpow(&x, p);
            return Self {
                private: Zeroizing::new(x.to_bytes_be()),
                public: to_fixed_be(&public),
            };
        }
    }

    /// Public value `g^x mod p` as a 256-byte field.
    #[must_use]
    pub const fn public_bytes(&self) -> [u8; DH_PUBLIC_SIZE] {
        self.public
    }

    /// Computes the shared secret with the peer's public value.
    ///
    /// # Errors
    /// `KeyExchange` if the peer value is outside `(1, p-1)`.
    pub fn exchange(self, peer_public: &[u8; DH_PUBLIC_SIZE]) -> Result<SharedSecret> {
        let y = BigUint::from_bytes_be(peer_public);
        if !in_open_range(&y) {
            return Err(CoreError::key_exchange("peer public value out of range"));
        }
        let x = BigUint::from_bytes_be(&self.private);
        let shared = y.modpow(&x, prime());
        Ok(SharedSecret(Zeroizing::new(shared.to_bytes_be())))
    }
}

impl fmt::Debug for DhKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DhKeyPair")
            .field("public", &format_args!("{:02x}{:02x}..", self.public[0], self.public[1]))
            .finish_non_exhaustive()
    }
}

// ============================================
// SharedSecret
// ============================================

/// Raw DH shared secret. Zeroed on drop.
pub struct SharedSecret(Zeroizing<Vec<u8>>);

impl SharedSecret {
    /// Big-endian secret bytes without leading zeros.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret([REDACTED])")
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_agrees() {
        let alice = DhKeyPair::generate();
        let bob = DhKeyPair::generate();
        let (a_pub, b_pub) = (alice.public_bytes(), bob.public_bytes());

        let s1 = alice.exchange(&b_pub).unwrap();
        let s2 = bob.exchange(&a_pub).unwrap();
        assert_eq!(s1.as_bytes(), s2.as_bytes());
        assert!(!s1.as_bytes().is_empty());
    }

    #[test]
    fn test_public_values_differ() {
        let a = DhKeyPair::generate();
        let b = DhKeyPair::generate();
        assert_ne!(a.public_bytes(), b.public_bytes());
    }

    #[test]
    fn test_rejects_degenerate_peer_values() {
        let zero = [0u8; DH_PUBLIC_SIZE];
        let mut one = [0u8; DH_PUBLIC_SIZE];
        one[DH_PUBLIC_SIZE - 1] = 1;
        let mut p_minus_one = GROUP14_PRIME;
        p_minus_one[DH_PUBLIC_SIZE - 1] -= 1;

        for bad in [zero, one, p_minus_one, GROUP14_PRIME, [0xFF; DH_PUBLIC_SIZE]] {
            let result = DhKeyPair::generate().exchange(&bad);
            assert!(matches!(result, Err(CoreError::KeyExchange { .. })));
        }
    }

    #[test]
    fn test_public_value_in_range() {
        let kp = DhKeyPair::generate();
        let y = BigUint::from_bytes_be(&kp.public_bytes());
        assert!(in_open_range(&y));
    }

    #[test]
    fn test_debug_hides_private() {
        let kp = DhKeyPair::generate();
        assert!(!format!("{kp:?}").contains("private"));
    }
}
