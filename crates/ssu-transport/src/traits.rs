// ============================================
// File: crates/ssu-transport/src/traits.rs
// ============================================
//! # Transport Trait
//!
//! ## Creation Reason
//! The SSU endpoint needs exactly four things from a socket: receive one
//! datagram with its source, send one datagram, report the bound address
//! and shut down. `Transport` is that contract, so the endpoint runs
//! unchanged over [`UdpTransport`](crate::UdpTransport) or the
//! [`MemoryNetwork`](crate::MemoryNetwork) used in tests.
//!
//! ## ⚠️ Important Note for Next Developer
//! - One transport is shared by the endpoint receive task and every
//!   session writing through it, hence `Send + Sync` and `&self`
//! - `shutdown` must wake a pending `recv` with `ShuttingDown`; the
//!   endpoint's receive loop relies on it to exit
//!
//! ## Last Modified
//! v0.1.0 - Initial trait definition

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;

/// Unreliable datagram socket under an SSU endpoint.
///
/// # Example
/// ```ignore
/// async fn reflect<T: Transport>(transport: &T) -> Result<()> {
///     let mut buf = vec![0u8; MAX_UDP_PAYLOAD];
///     loop {
///         let (len, from) = transport.recv(&mut buf).await?;
///         transport.send(&buf[..len], &from).await?;
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Receives one datagram into `buf`, returning its length and source.
    ///
    /// # Errors
    /// `ShuttingDown` after shutdown; `ReceiveFailed` for socket errors.
    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)>;

    /// Sends one datagram to `dest`.
    ///
    /// # Errors
    /// `ShuttingDown` after shutdown; `DatagramTooLarge` or `SendFailed`.
    async fn send(&self, buf: &[u8], dest: &SocketAddr) -> Result<usize>;

    /// Address the transport is bound to.
    ///
    /// # Errors
    /// Implementation-specific; the bundled transports never fail.
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Shuts the transport down and wakes pending receivers.
    ///
    /// # Errors
    /// Implementation-specific; the bundled transports never fail.
    async fn shutdown(&self) -> Result<()>;

    /// Returns `true` until the transport is shut down.
    fn is_active(&self) -> bool;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        (**self).recv(buf).await
    }

    async fn send(&self, buf: &[u8], dest: &SocketAddr) -> Result<usize> {
        (**self).send(buf, dest).await
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        (**self).local_addr()
    }

    async fn shutdown(&self) -> Result<()> {
        (**self).shutdown().await
    }

    fn is_active(&self) -> bool {
        (**self).is_active()
    }
}
