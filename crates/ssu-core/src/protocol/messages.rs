// ============================================
// File: crates/ssu-core/src/protocol/messages.rs
// ============================================
//! # Handshake Message Definitions
//!
//! ## Creation Reason
//! Typed forms of the handshake payloads carried inside SSU datagrams.
//!
//! ## Message Formats
//!
//! ### SessionRequest (initiator → responder)
//! ```text
//! ┌───────────────┬─────────┬───────────────────┐
//! │ X (256)       │ ipLen(1)│ ip (4 or 16)      │
//! └───────────────┴─────────┴───────────────────┘
//! ip = the address the initiator sent the request to
//! ```
//!
//! ### SessionCreated (responder → initiator)
//! ```text
//! ┌──────────┬────────┬────────┬─────────┬────────────┬─────────────┬───────────┬─────────┐
//! │ Y (256)  │ ipLen  │ ip     │ port(2) │ relayTag(4)│ signedOn(4) │ signature │ padding │
//! └──────────┴────────┴────────┴─────────┴────────────┴─────────────┴───────────┴─────────┘
//! ip/port = the initiator's address as observed by the responder
//! len(signature ‖ padding) is a multiple of 16
//! ```
//!
//! ### SessionConfirmed
//! Opaque bytes produced by an injected `ConfirmationCodec`.
//!
//! ## ⚠️ Important Note for Next Developer
//! - All integers are big-endian
//! - `WireAddress` keeps the raw IP bytes and a wide port so invalid
//!   values can be represented and rejected at encode time
//!
//! ## Last Modified
//! v0.1.0 - Initial handshake messages

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::Bytes;
use ssu_common::Timestamp;

use crate::crypto::DH_PUBLIC_SIZE;
use crate::error::{CoreError, Result};
use crate::protocol::flag::PayloadType;

// ============================================
// Size Constants
// ============================================

/// IPv4 address length on the wire.
pub const IPV4_LEN: usize = 4;

/// IPv6 address length on the wire.
pub const IPV6_LEN: usize = 16;

/// Smallest valid SessionRequest (IPv4).
pub const SESSION_REQUEST_MIN_SIZE: usize = DH_PUBLIC_SIZE + 1 + IPV4_LEN;

/// SessionCreated size without the address IP and the signature.
pub const SESSION_CREATED_FIXED_SIZE: usize = DH_PUBLIC_SIZE + 1 + 2 + 4 + 4;

// ============================================
// WireAddress
// ============================================

/// IP and port as they are about to be marshalled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WireAddress {
    /// Raw IP bytes; must be 4 or 16 long.
    pub ip: Vec<u8>,
    /// Port; must fit in 16 bits.
    pub port: u32,
}

impl WireAddress {
    /// Creates an address from raw parts.
    pub fn new(ip: impl Into<Vec<u8>>, port: u32) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    /// Checks the IP length.
    ///
    /// # Errors
    /// `InvalidAddress` unless the IP is 4 or 16 bytes.
    pub fn check_ip(&self) -> Result<()> {
        check_ip_len(self.ip.len())
    }

    /// Port narrowed to the 16-bit wire field.
    ///
    /// # Errors
    /// `PortOverflow` above 65535.
    pub fn wire_port(&self) -> Result<u16> {
        u16::try_from(self.port).map_err(|_| CoreError::PortOverflow { port: self.port })
    }

    /// Converts to a socket address.
    ///
    /// # Errors
    /// `InvalidAddress` or `PortOverflow`.
    pub fn to_socket_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(ip_from_bytes(&self.ip)?, self.wire_port()?))
    }
}

impl From<SocketAddr> for WireAddress {
    fn from(addr: SocketAddr) -> Self {
        Self {
            ip: ip_to_bytes(addr.ip()),
            port: u32::from(addr.port()),
        }
    }
}

impl fmt::Display for WireAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match ip_from_bytes(&self.ip) {
            Ok(IpAddr::V6(ip)) => write!(f, "[{ip}]:{}", self.port),
            Ok(ip) => write!(f, "{ip}:{}", self.port),
            Err(_) => write!(f, "<{} byte ip>:{}", self.ip.len(), self.port),
        }
    }
}

pub(crate) fn check_ip_len(len: usize) -> Result<()> {
    if len == IPV4_LEN || len == IPV6_LEN {
        Ok(())
    } else {
        Err(CoreError::invalid_address(format!(
            "IP must be 4 or 16 bytes, got {len}"
        )))
    }
}

/// Raw octets of an IP address.
#[must_use]
pub fn ip_to_bytes(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

/// Parses 4 or 16 raw octets.
///
/// # Errors
/// `InvalidAddress` for any other length.
pub fn ip_from_bytes(bytes: &[u8]) -> Result<IpAddr> {
    if let Ok(v4) = <[u8; IPV4_LEN]>::try_from(bytes) {
        return Ok(IpAddr::V4(Ipv4Addr::from(v4)));
    }
    if let Ok(v6) = <[u8; IPV6_LEN]>::try_from(bytes) {
        return Ok(IpAddr::V6(Ipv6Addr::from(v6)));
    }
    Err(CoreError::invalid_address(format!(
        "IP must be 4 or 16 bytes, got {}",
        bytes.len()
    )))
}

fn short_hex(bytes: &[u8]) -> String {
    bytes.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

// ============================================
// SessionRequest
// ============================================

/// First handshake message.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionRequest {
    /// Initiator DH public value.
    pub x: [u8; DH_PUBLIC_SIZE],
    /// Raw IP the initiator sent this request to.
    pub ip: Vec<u8>,
}

impl SessionRequest {
    /// Builds a request addressed to `responder_ip`.
    #[must_use]
    pub fn new(x: [u8; DH_PUBLIC_SIZE], responder_ip: IpAddr) -> Self {
        Self {
            x,
            ip: ip_to_bytes(responder_ip),
        }
    }

    /// The responder IP carried in the request.
    ///
    /// # Errors
    /// `InvalidAddress` if the IP length is invalid.
    pub fn ip_addr(&self) -> Result<IpAddr> {
        ip_from_bytes(&self.ip)
    }
}

impl fmt::Debug for SessionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRequest")
            .field("x", &format_args!("{}..", short_hex(&self.x)))
            .field("ip", &self.ip)
            .finish()
    }
}

// ============================================
// SessionCreated
// ============================================

/// Second handshake message.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCreated {
    /// Responder DH public value.
    pub y: [u8; DH_PUBLIC_SIZE],
    /// Initiator address as observed by the responder.
    pub address: WireAddress,
    /// Relay tag offered to the initiator, 0 for none.
    pub relay_tag: u32,
    /// Time the responder signed at.
    pub signed_on: Timestamp,
    /// Responder signature over the SessionCreated hash.
    pub signature: Vec<u8>,
}

impl fmt::Debug for SessionCreated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCreated")
            .field("y", &format_args!("{}..", short_hex(&self.y)))
            .field("address", &format_args!("{}", self.address))
            .field("relay_tag", &self.relay_tag)
            .field("signed_on", &self.signed_on)
            .field("signature_len", &self.signature.len())
            .finish()
    }
}

// ============================================
// HandshakeMessage
// ============================================

/// Any of the three handshake messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    /// First message.
    SessionRequest(SessionRequest),
    /// Second message.
    SessionCreated(SessionCreated),
    /// Third message; opaque, possibly followed by datagram padding.
    SessionConfirmed(Bytes),
}

impl HandshakeMessage {
    /// Flag payload type carrying this message.
    #[must_use]
    pub const fn payload_type(&self) -> PayloadType {
        match self {
            Self::SessionRequest(_) => PayloadType::SessionRequest,
            Self::SessionCreated(_) => PayloadType::SessionCreated,
            Self::SessionConfirmed(_) => PayloadType::SessionConfirmed,
        }
    }
}

// ============================================
// Tests
// ============================================
