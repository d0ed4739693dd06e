// ============================================
// File: crates/ssu-core/src/protocol/flag.rs
// ============================================
//! # Flag Byte
//!
//! ## Creation Reason
//! Every SSU datagram starts its encrypted region with a single flag byte
//! announcing the payload type and two option bits.
//!
//! ## Layout
//! ```text
//!   7   6   5   4   3   2   1   0
//! ┌───────────────┬───┬───┬───────┐
//! │ payload type  │ R │ E │ resvd │
//! └───────────────┴───┴───┴───────┘
//!  R = rekey, E = extended options, resvd = 0
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Reserved bits are ignored on read and always written as zero
//! - Payload types 8..15 are unassigned but still representable
//!
//! ## Last Modified
//! v0.1.0 - Initial flag codec

use std::fmt;

// ============================================
// Bit Layout Constants
// ============================================

const PAYLOAD_TYPE_SHIFT: u8 = 4;
const REKEY_BIT: u8 = 1 << 3;
const EXTENDED_BIT: u8 = 1 << 2;

/// Mask of the two reserved low bits.
pub const RESERVED_MASK: u8 = 0b0000_0011;

// ============================================
// Raw Codec
// ============================================

/// Splits a flag byte into `(payload_type, rekey, extended)`.
///
/// Bits 0-1 are ignored.
///
/// # Example
/// ```
/// use ssu_core::protocol::flag::{compose, decompose};
///
/// let (ty, rekey, ext) = decompose(0x5C);
/// assert_eq!((ty, rekey, ext), (5, true, true));
/// assert_eq!(compose(ty, rekey, ext), 0x5C);
/// ```
#[must_use]
pub const fn decompose(flag: u8) -> (u8, bool, bool) {
    (
        flag >> PAYLOAD_TYPE_SHIFT,
        flag & REKEY_BIT != 0,
        flag & EXTENDED_BIT != 0,
    )
}

/// Packs a payload type and option bits into a flag byte.
///
/// Only the low four bits of `payload_type` are used.
#[must_use]
pub const fn compose(payload_type: u8, rekey: bool, extended: bool) -> u8 {
    let mut flag = (payload_type & 0x0F) << PAYLOAD_TYPE_SHIFT;
    if rekey {
        flag |= REKEY_BIT;
    }
    if extended {
        flag |= EXTENDED_BIT;
    }
    flag
}

// ============================================
// PayloadType
// ============================================

/// Payload type carried in the top four bits of the flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    /// First handshake message (initiator → responder).
    SessionRequest,
    /// Second handshake message (responder → initiator).
    SessionCreated,
    /// Third handshake message (initiator → responder).
    SessionConfirmed,
    /// Relay request to an introducer.
    RelayRequest,
    /// Relay introduction.
    RelayIntro,
    /// Session data.
    Data,
    /// Peer reachability test.
    PeerTest,
    /// Session teardown.
    SessionDestroyed,
    /// Unassigned value 8..=15.
    Unknown(u8),
}

impl PayloadType {
    /// Converts the 4-bit wire value.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value & 0x0F {
            0 => Self::SessionRequest,
            1 => Self::SessionCreated,
            2 => Self::SessionConfirmed,
            3 => Self::RelayRequest,
            4 => Self::RelayIntro,
            5 => Self::Data,
            6 => Self::PeerTest,
            7 => Self::SessionDestroyed,
            other => Self::Unknown(other),
        }
    }

    /// Returns the 4-bit wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::SessionRequest => 0,
            Self::SessionCreated => 1,
            Self::SessionConfirmed => 2,
            Self::RelayRequest => 3,
            Self::RelayIntro => 4,
            Self::Data => 5,
            Self::PeerTest => 6,
            Self::SessionDestroyed => 7,
            Self::Unknown(v) => v & 0x0F,
        }
    }

    /// `true` for the three handshake message types.
    #[must_use]
    pub const fn is_handshake(self) -> bool {
        matches!(
            self,
            Self::SessionRequest | Self::SessionCreated | Self::SessionConfirmed
        )
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionRequest => write!(f, "SessionRequest"),
            Self::SessionCreated => write!(f, "SessionCreated"),
            Self::SessionConfirmed => write!(f, "SessionConfirmed"),
            Self::RelayRequest => write!(f, "RelayRequest"),
            Self::RelayIntro => write!(f, "RelayIntro"),
            Self::Data => write!(f, "Data"),
            Self::PeerTest => write!(f, "PeerTest"),
            Self::SessionDestroyed => write!(f, "SessionDestroyed"),
            Self::Unknown(v) => write!(f, "Unknown({v})"),
        }
    }
}

// ============================================
// Flag
// ============================================

/// Decoded flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flag {
    /// Payload type.
    pub payload_type: PayloadType,
    /// Rekey requested.
    pub rekey: bool,
    /// Extended options present.
    pub extended: bool,
}

impl Flag {
    /// Flag with both option bits clear.
    #[must_use]
    pub const fn new(payload_type: PayloadType) -> Self {
        Self {
            payload_type,
            rekey: false,
            extended: false,
        }
    }

    /// Decodes a flag byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        let (ty, rekey, extended) = decompose(byte);
        Self {
            payload_type: PayloadType::from_u8(ty),
            rekey,
            extended,
        }
    }

    /// Encodes to a flag byte with the reserved bits clear.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        compose(self.payload_type.as_u8(), self.rekey, self.extended)
    }
}

impl From<PayloadType> for Flag {
    fn from(payload_type: PayloadType) -> Self {
        Self::new(payload_type)
    }
}

// ============================================
// Tests
// ============================================
