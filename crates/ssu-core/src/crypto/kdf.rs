// ============================================
// File: crates/ssu-core/src/crypto/kdf.rs
// ============================================
//! # Key Derivation Functions
//!
//! ## Main Functionality
//! - `derive_session_key`: 32-byte encryption key from the DH secret
//! - `derive_mac_key`: 32-byte MAC key from the DH secret
//! - `derive_session_keys`: both, wrapped in [`SessionKeys`]
//!
//! ## Derivation
//! ```text
//! normalized = 0x00 ‖ secret   if secret[0] & 0x80
//!            = secret          otherwise
//!
//! session key = normalized[0..32]            (right-padded with 0x00)
//! mac key     = normalized[32..64]           if len(normalized) >= 64
//!             = SHA-256(secret)              otherwise
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The long-secret MAC branch reads the *normalized* bytes so the MAC
//!   key is always the 32 bytes directly after the session key
//! - A group-14 secret is almost always 256 bytes, so the SHA-256 branch
//!   is only reached with short test inputs
//!
//! ## Last Modified
//! v0.1.0 - Initial key derivation

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::keys::SessionKeys;
use super::{MAC_KEY_SIZE, SESSION_KEY_SIZE};
use crate::error::{CoreError, Result};

/// Minimum normalized length for the MAC key to be sliced out directly.
const LONG_SECRET_LEN: usize = SESSION_KEY_SIZE + MAC_KEY_SIZE;

/// Returns the secret as an unsigned big-endian byte string.
fn normalize(secret: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let first = secret
        .first()
        .ok_or_else(|| CoreError::invalid_input("shared_secret", "cannot be empty"))?;

    let mut out = Zeroizing::new(Vec::with_capacity(secret.len() + 1));
    if first & 0x80 != 0 {
        out.push(0);
    }
    out.extend_from_slice(secret);
    Ok(out)
}

/// Derives the 32-byte session (encryption) key.
///
/// # Errors
/// `InvalidInput` if `secret` is empty.
pub fn derive_session_key(secret: &[u8]) -> Result<[u8; SESSION_KEY_SIZE]> {
    let normalized = normalize(secret)?;
    let mut key = [0u8; SESSION_KEY_SIZE];
    let take = normalized.len().min(SESSION_KEY_SIZE);
    key[..take].copy_from_slice(&normalized[..take]);
    Ok(key)
}

/// Derives the 32-byte MAC key.
///
/// # Errors
/// `InvalidInput` if `secret` is empty.
pub fn derive_mac_key(secret: &[u8]) -> Result<[u8; MAC_KEY_SIZE]> {
    let normalized = normalize(secret)?;
    let mut key = [0u8; MAC_KEY_SIZE];
    if normalized.len() >= LONG_SECRET_LEN {
        key.copy_from_slice(&normalized[SESSION_KEY_SIZE..LONG_SECRET_LEN]);
    } else {
        key.copy_from_slice(&Sha256::digest(secret));
    }
    Ok(key)
}

/// Derives both session keys from the raw DH secret.
///
/// # Errors
/// `InvalidInput` if `secret` is empty.
pub fn derive_session_keys(secret: &[u8]) -> Result<SessionKeys> {
    let encryption = derive_session_key(secret)?;
    let mac = derive_mac_key(secret)?;
    Ok(SessionKeys::new(encryption, mac))
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            derive_session_key(&[]),
            Err(CoreError::InvalidInput { .. })
        ));
        assert!(matches!(
            derive_mac_key(&[]),
            Err(CoreError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_short_secret_vector() {
        let secret = b"test dh key";

        let session = derive_session_key(secret).unwrap();
        assert_eq!(session.len(), 32);
        assert_eq!(&session[..secret.len()], secret);
        assert!(session[secret.len()..].iter().all(|&b| b == 0));

        let mac = derive_mac_key(secret).unwrap();
        assert_eq!(mac.len(), 32);
        assert_eq!(mac.as_slice(), Sha256::digest(secret).as_slice());
    }

    #[test]
    fn test_high_bit_prepends_zero() {
        let secret = [0x80u8, 0x01, 0x02];
        let key = derive_session_key(&secret).unwrap();
        assert_eq!(&key[..4], &[0x00, 0x80, 0x01, 0x02]);
    }

    #[test]
    fn test_long_secret_slices() {
        let secret: Vec<u8> = (0u8..=255).map(|b| b & 0x7F).collect();
        let session = derive_session_key(&secret).unwrap();
        let mac = derive_mac_key(&secret).unwrap();

        assert_eq!(&session[..], &secret[..32]);
        assert_eq!(&mac[..], &secret[32..64]);
    }

    #[test]
    fn test_long_secret_with_high_bit_uses_normalized_offsets() {
        let mut secret = vec![0x11u8; 256];
        secret[0] = 0xFF;
        let session = derive_session_key(&secret).unwrap();
        let mac = derive_mac_key(&secret).unwrap();

        assert_eq!(session[0], 0x00);
        assert_eq!(&session[1..], &secret[..31]);
        assert_eq!(&mac[..], &secret[31..63]);
    }

    #[test]
    fn test_lengths_for_every_size() {
        for len in 1..300usize {
            let secret = vec![0xA5u8; len];
            assert_eq!(derive_session_key(&secret).unwrap().len(), 32);
            assert_eq!(derive_mac_key(&secret).unwrap().len(), 32);
        }
    }

    #[test]
    fn test_derive_session_keys_is_deterministic() {
        let a = derive_session_keys(b"test dh key").unwrap();
        let b = derive_session_keys(b"test dh key").unwrap();
        assert_eq!(a, b);
    }
}
