// ============================================
// File: crates/ssu-core/src/crypto/transport.rs
// ============================================
//! # Datagram Encryption
//!
//! ## Creation Reason
//! Every SSU datagram, handshake or data, is individually encrypted with
//! AES-128-CBC and authenticated with HMAC-MD5. This module owns that
//! framing.
//!
//! ## Main Functionality
//! - `Datagram`: decoded (flag, timestamp, payload) triple
//! - `DatagramCodec`: per-call keyed encoder/decoder
//! - `padding_len`: padding needed to block-align the encrypted region
//!
//! ## Wire Format
//! ```text
//! ┌──────────────┬──────────────┬───────────────────────────────────┐
//! │ MAC (16)     │ IV (16)      │ AES-128-CBC encrypted region      │
//! │              │              │ ├─ flag (1)                       │
//! │              │              │ ├─ timestamp (4, BE seconds)      │
//! │              │              │ ├─ payload (0..=32768)            │
//! │              │              │ └─ random padding (0..=15)        │
//! └──────────────┴──────────────┴───────────────────────────────────┘
//!
//! MAC = HMAC-MD5(mac_key, ciphertext ‖ IV ‖ u16 BE(len - 32))
//! ```
//!
//! ## Security Properties
//! - MAC is verified in constant time BEFORE any decryption
//! - Fresh random IV per datagram from `OsRng`
//! - Stateless: no shared mutable state, safe to call from many tasks
//!
//! ## ⚠️ Important Note for Next Developer
//! - The decoded payload still carries the random padding; higher layers
//!   that need exact lengths frame their own (see `SessionConnection`)
//! - The encrypted region must stay a multiple of 16 bytes
//!
//! ## Last Modified
//! v0.1.0 - Initial datagram codec

use aes::Aes128;
use bytes::{BufMut, Bytes, BytesMut};
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use md5::Md5;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use tracing::trace;

use ssu_common::Timestamp;

use super::keys::FramingKeys;
use super::{BLOCK_SIZE, CIPHER_KEY_SIZE, MAC_KEY_SIZE, MAC_SIZE};
use crate::error::{CoreError, Result};
use crate::protocol::flag::Flag;

type HmacMd5 = Hmac<Md5>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

// ============================================
// Constants
// ============================================

/// Largest payload a single datagram may carry.
pub const MAX_PAYLOAD_SIZE: usize = 32768;

/// MAC plus IV.
pub const HEADER_SIZE: usize = MAC_SIZE + BLOCK_SIZE;

/// Flag byte plus 4-byte timestamp.
const PREAMBLE_SIZE: usize = 5;

/// Shortest buffer that can hold a flag and timestamp.
pub const MIN_DATAGRAM_SIZE: usize = HEADER_SIZE + PREAMBLE_SIZE;

/// Largest datagram the codec ever produces.
pub const MAX_DATAGRAM_SIZE: usize = HEADER_SIZE + PREAMBLE_SIZE + MAX_PAYLOAD_SIZE + BLOCK_SIZE - 1;

/// Padding appended after a payload of `payload_len` bytes.
///
/// ```
/// use ssu_core::crypto::transport::padding_len;
///
/// assert_eq!(padding_len(11), 0);
/// assert_eq!(padding_len(0), 11);
/// assert_eq!(padding_len(12), 15);
/// ```
#[must_use]
pub const fn padding_len(payload_len: usize) -> usize {
    let rem = (PREAMBLE_SIZE + payload_len) % BLOCK_SIZE;
    if rem == 0 {
        0
    } else {
        BLOCK_SIZE - rem
    }
}

// ============================================
// Datagram
// ============================================

/// Decoded datagram contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Flag byte.
    pub flag: Flag,
    /// Sender's clock at send time.
    pub timestamp: Timestamp,
    /// Payload. After decoding this includes the trailing padding.
    pub payload: Bytes,
}

impl Datagram {
    /// Creates a datagram stamped with the current time.
    pub fn new(flag: impl Into<Flag>, payload: impl Into<Bytes>) -> Self {
        Self {
            flag: flag.into(),
            timestamp: Timestamp::now(),
            payload: payload.into(),
        }
    }

    /// Overrides the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// ============================================
// DatagramCodec
// ============================================

/// Stateless datagram encoder/decoder.
///
/// Keys are passed on every call. The same codec value serves handshake
/// datagrams (intro key) and data datagrams (session keys).
///
/// # Example
/// ```
/// use ssu_core::crypto::{DatagramCodec, IntroKey};
/// use ssu_core::crypto::transport::Datagram;
/// use ssu_core::protocol::PayloadType;
///
/// let key = IntroKey::generate();
/// let codec = DatagramCodec::new();
///
/// let wire = codec.seal(&key, &Datagram::new(PayloadType::Data, &b"hello"[..])).unwrap();
/// let opened = codec.open(&key, &wire).unwrap();
/// assert_eq!(&opened.payload[..5], b"hello");
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct DatagramCodec;

impl DatagramCodec {
    /// Creates a codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encodes `datagram` onto the end of `out`.
    ///
    /// # Errors
    /// - `PayloadTooLarge` above [`MAX_PAYLOAD_SIZE`]
    /// - `InvalidKeyMaterial` if `mac_key` is not 32 or `cipher_key` not 16 bytes
    pub fn encode_into(
        &self,
        datagram: &Datagram,
        mac_key: &[u8],
        cipher_key: &[u8],
        out: &mut BytesMut,
    ) -> Result<()> {
        let mut iv = [0u8; BLOCK_SIZE];
        OsRng.fill_bytes(&mut iv);
        let pad = padding_len(datagram.payload.len());
        let mut padding = [0u8; BLOCK_SIZE];
        OsRng.fill_bytes(&mut padding[..pad]);
        encode_with(datagram, mac_key, cipher_key, &iv, &padding[..pad], out)
    }

    /// Encodes `datagram` into a fresh buffer.
    ///
    /// # Errors
    /// See [`encode_into`](Self::encode_into).
    pub fn encode(&self, datagram: &Datagram, mac_key: &[u8], cipher_key: &[u8]) -> Result<BytesMut> {
        let mut out = BytesMut::with_capacity(
            HEADER_SIZE + PREAMBLE_SIZE + datagram.payload.len() + BLOCK_SIZE,
        );
        self.encode_into(datagram, mac_key, cipher_key, &mut out)?;
        Ok(out)
    }

    /// Verifies and decrypts a wire datagram.
    ///
    /// # Errors
    /// - `MalformedDatagram` for short or unaligned buffers
    /// - `AuthenticationFailed` if the MAC does not match (nothing is decrypted)
    /// - `InvalidKeyMaterial` for wrong key lengths
    pub fn decode(&self, buf: &[u8], mac_key: &[u8], cipher_key: &[u8]) -> Result<Datagram> {
        if buf.len() < MIN_DATAGRAM_SIZE {
            return Err(CoreError::malformed_datagram(format!(
                "{} bytes is shorter than the {MIN_DATAGRAM_SIZE}-byte minimum",
                buf.len()
            )));
        }
        if (buf.len() - HEADER_SIZE) % BLOCK_SIZE != 0 {
            return Err(CoreError::malformed_datagram(format!(
                "encrypted region of {} bytes is not block aligned",
                buf.len() - HEADER_SIZE
            )));
        }
        check_key_lengths(mac_key, cipher_key)?;

        let (received_mac, rest) = buf.split_at(MAC_SIZE);
        let (iv, ciphertext) = rest.split_at(BLOCK_SIZE);

        let expected = compute_mac(mac_key, ciphertext, iv)?;
        if !bool::from(expected.as_slice().ct_eq(received_mac)) {
            trace!(len = buf.len(), "Datagram MAC mismatch");
            return Err(CoreError::AuthenticationFailed);
        }

        let mut plain = BytesMut::from(ciphertext);
        let mut dec = Aes128CbcDec::new_from_slices(cipher_key, iv)
            .map_err(|_| CoreError::invalid_key("cipher key or IV length"))?;
        for block in plain.chunks_exact_mut(BLOCK_SIZE) {
            dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        let flag = Flag::from_byte(plain[0]);
        let timestamp = Timestamp::from_be_bytes([plain[1], plain[2], plain[3], plain[4]]);
        let payload = plain.split_off(PREAMBLE_SIZE).freeze();

        Ok(Datagram {
            flag,
            timestamp,
            payload,
        })
    }

    /// Encodes with the MAC and cipher keys of `keys`.
    ///
    /// # Errors
    /// See [`encode_into`](Self::encode_into).
    pub fn seal<K: FramingKeys + ?Sized>(&self, keys: &K, datagram: &Datagram) -> Result<Bytes> {
        Ok(self
            .encode(datagram, keys.mac_key(), keys.cipher_key())?
            .freeze())
    }

    /// Decodes with the MAC and cipher keys of `keys`.
    ///
    /// # Errors
    /// See [`decode`](Self::decode).
    pub fn open<K: FramingKeys + ?Sized>(&self, keys: &K, buf: &[u8]) -> Result<Datagram> {
        self.decode(buf, keys.mac_key(), keys.cipher_key())
    }
}

// ============================================
// Internals
// ============================================

fn check_key_lengths(mac_key: &[u8], cipher_key: &[u8]) -> Result<()> {
    if mac_key.len() != MAC_KEY_SIZE {
        return Err(CoreError::invalid_key(format!(
            "MAC key must be {MAC_KEY_SIZE} bytes, got {}",
            mac_key.len()
        )));
    }
    if cipher_key.len() != CIPHER_KEY_SIZE {
        return Err(CoreError::invalid_key(format!(
            "cipher key must be {CIPHER_KEY_SIZE} bytes, got {}",
            cipher_key.len()
        )));
    }
    Ok(())
}

fn compute_mac(mac_key: &[u8], ciphertext: &[u8], iv: &[u8]) -> Result<[u8; MAC_SIZE]> {
    let len = u16::try_from(ciphertext.len())
        .map_err(|_| CoreError::malformed_datagram("encrypted region exceeds 65535 bytes"))?;
    let mut mac = <HmacMd5 as Mac>::new_from_slice(mac_key)
        .map_err(|_| CoreError::invalid_key("MAC key length"))?;
    mac.update(ciphertext);
    mac.update(iv);
    mac.update(&len.to_be_bytes());
    let mut tag = [0u8; MAC_SIZE];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    Ok(tag)
}

/// Deterministic encoder core: IV and padding bytes are supplied.
fn encode_with(
    datagram: &Datagram,
    mac_key: &[u8],
    cipher_key: &[u8],
    iv: &[u8; BLOCK_SIZE],
    padding: &[u8],
    out: &mut BytesMut,
) -> Result<()> {
    let payload_len = datagram.payload.len();
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(CoreError::PayloadTooLarge {
            max: MAX_PAYLOAD_SIZE,
            actual: payload_len,
        });
    }
    check_key_lengths(mac_key, cipher_key)?;
    debug_assert_eq!(padding.len(), padding_len(payload_len));

    let start = out.len();
    out.reserve(HEADER_SIZE + PREAMBLE_SIZE + payload_len + padding.len());
    out.put_bytes(0, MAC_SIZE);
    out.put_slice(iv);
    out.put_u8(datagram.flag.to_byte());
    out.put_slice(&datagram.timestamp.to_be_bytes());
    out.put_slice(&datagram.payload);
    out.put_slice(padding);

    let frame = &mut out[start..];
    let (mac_slot, rest) = frame.split_at_mut(MAC_SIZE);
    let (iv_slot, region) = rest.split_at_mut(BLOCK_SIZE);

    let mut enc = Aes128CbcEnc::new_from_slices(cipher_key, iv_slot)
        .map_err(|_| CoreError::invalid_key("cipher key or IV length"))?;
    for block in region.chunks_exact_mut(BLOCK_SIZE) {
        enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }

    let tag = compute_mac(mac_key, region, iv_slot)?;
    mac_slot.copy_from_slice(&tag);
    Ok(())
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{IntroKey, SessionKeys};
    use crate::protocol::flag::PayloadType;

    const MAC_KEY: [u8; 32] = [0x5A; 32];
    const CIPHER_KEY: [u8; 16] = [0xA5; 16];

    fn sample(payload: &[u8]) -> Datagram {
        Datagram::new(PayloadType::Data, Bytes::copy_from_slice(payload))
            .with_timestamp(Timestamp::from_secs(0x0102_0304))
    }

    #[test]
    fn test_roundtrip_preserves_fields() {
        let codec = DatagramCodec::new();
        let datagram = sample(b"Hello, SSU!");

        let wire = codec.encode(&datagram, &MAC_KEY, &CIPHER_KEY).unwrap();
        let decoded = codec.decode(&wire, &MAC_KEY, &CIPHER_KEY).unwrap();

        assert_eq!(decoded.flag, datagram.flag);
        assert_eq!(decoded.timestamp, datagram.timestamp);
        assert_eq!(&decoded.payload[..11], b"Hello, SSU!");
    }

    #[test]
    fn test_encrypted_region_always_block_aligned() {
        let codec = DatagramCodec::new();
        for len in 0..64usize {
            let payload = vec![0x33u8; len];
            let wire = codec.encode(&sample(&payload), &MAC_KEY, &CIPHER_KEY).unwrap();
            assert_eq!((wire.len() - HEADER_SIZE) % BLOCK_SIZE, 0, "payload {len}");
            assert_eq!(wire.len(), HEADER_SIZE + PREAMBLE_SIZE + len + padding_len(len));

            let decoded = codec.decode(&wire, &MAC_KEY, &CIPHER_KEY).unwrap();
            assert_eq!(decoded.payload.len(), len + padding_len(len));
            assert_eq!(&decoded.payload[..len], payload.as_slice());
        }
    }

    #[test]
    fn test_padding_len_range() {
        for len in 0..1000usize {
            let pad = padding_len(len);
            assert!(pad < BLOCK_SIZE);
            assert_eq!((PREAMBLE_SIZE + len + pad) % BLOCK_SIZE, 0);
        }
    }

    #[test]
    fn test_any_bit_flip_fails_authentication() {
        let codec = DatagramCodec::new();
        let wire = codec.encode(&sample(b"tamper target"), &MAC_KEY, &CIPHER_KEY).unwrap();

        for i in 0..wire.len() {
            let mut forged = wire.to_vec();
            forged[i] ^= 0x01;
            let result = codec.decode(&forged, &MAC_KEY, &CIPHER_KEY);
            assert!(
                matches!(result, Err(CoreError::AuthenticationFailed)),
                "flip at byte {i} was accepted"
            );
        }
    }

    #[test]
    fn test_wrong_mac_key_fails_authentication() {
        let codec = DatagramCodec::new();
        let wire = codec.encode(&sample(b"x"), &MAC_KEY, &CIPHER_KEY).unwrap();
        let result = codec.decode(&wire, &[0x00; 32], &CIPHER_KEY);
        assert!(matches!(result, Err(CoreError::AuthenticationFailed)));
    }

    #[test]
    fn test_short_and_unaligned_buffers() {
        let codec = DatagramCodec::new();
        for len in [0usize, 16, 32, 36] {
            let result = codec.decode(&vec![0u8; len], &MAC_KEY, &CIPHER_KEY);
            assert!(matches!(result, Err(CoreError::MalformedDatagram { .. })), "len {len}");
        }
        for len in [37usize, 47, 49, 63] {
            let result = codec.decode(&vec![0u8; len], &MAC_KEY, &CIPHER_KEY);
            assert!(matches!(result, Err(CoreError::MalformedDatagram { .. })), "len {len}");
        }
        // aligned garbage gets as far as the MAC check
        let result = codec.decode(&[0u8; 48], &MAC_KEY, &CIPHER_KEY);
        assert!(matches!(result, Err(CoreError::AuthenticationFailed)));
    }

    #[test]
    fn test_wrong_key_lengths() {
        let codec = DatagramCodec::new();
        let datagram = sample(b"k");
        assert!(matches!(
            codec.encode(&datagram, &[0u8; 16], &CIPHER_KEY),
            Err(CoreError::InvalidKeyMaterial { .. })
        ));
        assert!(matches!(
            codec.encode(&datagram, &MAC_KEY, &[0u8; 32]),
            Err(CoreError::InvalidKeyMaterial { .. })
        ));
        assert!(matches!(
            codec.decode(&[0u8; 48], &MAC_KEY, &[0u8; 8]),
            Err(CoreError::InvalidKeyMaterial { .. })
        ));
    }

    #[test]
    fn test_payload_limits() {
        let codec = DatagramCodec::new();
        let max = vec![0x11u8; MAX_PAYLOAD_SIZE];
        let wire = codec.encode(&sample(&max), &MAC_KEY, &CIPHER_KEY).unwrap();
        assert!(wire.len() <= MAX_DATAGRAM_SIZE);
        assert!(codec.decode(&wire, &MAC_KEY, &CIPHER_KEY).is_ok());

        let over = vec![0x11u8; MAX_PAYLOAD_SIZE + 1];
        assert!(matches!(
            codec.encode(&sample(&over), &MAC_KEY, &CIPHER_KEY),
            Err(CoreError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_encode_into_appends() {
        let codec = DatagramCodec::new();
        let mut buf = BytesMut::from(&b"prefix"[..]);
        codec.encode_into(&sample(b"abc"), &MAC_KEY, &CIPHER_KEY, &mut buf).unwrap();
        assert_eq!(&buf[..6], b"prefix");
        let decoded = codec.decode(&buf[6..], &MAC_KEY, &CIPHER_KEY).unwrap();
        assert_eq!(&decoded.payload[..3], b"abc");
    }

    #[test]
    fn test_fresh_iv_per_datagram() {
        let codec = DatagramCodec::new();
        let a = codec.encode(&sample(b"same"), &MAC_KEY, &CIPHER_KEY).unwrap();
        let b = codec.encode(&sample(b"same"), &MAC_KEY, &CIPHER_KEY).unwrap();
        assert_ne!(a[MAC_SIZE..HEADER_SIZE], b[MAC_SIZE..HEADER_SIZE]);
    }

    #[test]
    fn test_deterministic_layout() {
        let iv = [0x07u8; BLOCK_SIZE];
        let datagram = sample(b"0123456789a");
        let mut wire = BytesMut::new();
        encode_with(&datagram, &MAC_KEY, &CIPHER_KEY, &iv, &[], &mut wire).unwrap();

        assert_eq!(wire.len(), 48);
        assert_eq!(&wire[MAC_SIZE..HEADER_SIZE], &iv);
        let expected_mac = compute_mac(&MAC_KEY, &wire[HEADER_SIZE..], &iv).unwrap();
        assert_eq!(&wire[..MAC_SIZE], &expected_mac);

        let decoded = DatagramCodec::new().decode(&wire, &MAC_KEY, &CIPHER_KEY).unwrap();
        assert_eq!(&decoded.payload[..], b"0123456789a");
        assert_eq!(decoded.timestamp.as_secs(), 0x0102_0304);
    }

    #[test]
    fn test_seal_open_with_framing_keys() {
        let codec = DatagramCodec::new();
        let intro = IntroKey::generate();
        let session = SessionKeys::new([1; 32], [2; 32]);
        let datagram = Datagram::new(PayloadType::SessionRequest, &b"req"[..]);

        let wire = codec.seal(&intro, &datagram).unwrap();
        assert_eq!(codec.open(&intro, &wire).unwrap().flag.payload_type, PayloadType::SessionRequest);
        assert!(matches!(codec.open(&session, &wire), Err(CoreError::AuthenticationFailed)));
    }
}
