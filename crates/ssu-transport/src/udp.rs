// ============================================
// File: crates/ssu-transport/src/udp.rs
// ============================================
//! # UDP Transport Implementation
//!
//! ## Creation Reason
//! Real-network transport for SSU: a Tokio UDP socket behind the
//! `Transport` trait.
//!
//! ## Main Functionality
//! - `UdpTransport`: bind, send, receive, shutdown
//! - `UdpOptions`: socket buffer sizes and address reuse
//!
//! ## Design Choices
//! - socket2 for option control before handing the socket to Tokio
//! - Shutdown is broadcast on a `watch` channel so a receiver blocked in
//!   `recv_from` returns `ShuttingDown` immediately
//!
//! ## ⚠️ Important Note for Next Developer
//! - UDP is connectionless: no delivery, ordering or duplication guarantees
//! - Maximum UDP payload is 65507 bytes over IPv4
//!
//! ## Last Modified
//! v0.1.0 - Initial UDP transport implementation

use std::net::SocketAddr;

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// Largest UDP payload over IPv4.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

// ============================================
// UdpOptions
// ============================================

/// Socket options applied before binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpOptions {
    /// `SO_REUSEADDR`.
    pub reuse_address: bool,
    /// `SO_RCVBUF` in bytes, if set.
    pub recv_buffer_size: Option<usize>,
    /// `SO_SNDBUF` in bytes, if set.
    pub send_buffer_size: Option<usize>,
}

impl Default for UdpOptions {
    fn default() -> Self {
        Self {
            reuse_address: true,
            recv_buffer_size: None,
            send_buffer_size: None,
        }
    }
}

// ============================================
// UdpTransport
// ============================================

/// UDP-based transport.
///
/// # Example
/// ```ignore
/// use ssu_transport::{Transport, UdpTransport};
///
/// let transport = UdpTransport::bind("0.0.0.0:8887").await?;
/// let mut buf = vec![0u8; 65_535];
/// let (len, from) = transport.recv(&mut buf).await?;
/// transport.send(&buf[..len], &from).await?;
/// ```
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
}

impl UdpTransport {
    /// Binds to an address string such as `"0.0.0.0:8887"`.
    ///
    /// # Errors
    /// `InvalidAddress` if the string does not parse, otherwise bind errors.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self> {
        let addr_str = addr.as_ref();
        let socket_addr: SocketAddr = addr_str
            .parse()
            .map_err(|_| TransportError::InvalidAddress {
                addr: addr_str.to_string(),
            })?;

        Self::bind_addr(socket_addr).await
    }

    /// Binds to a socket address with default options.
    ///
    /// # Errors
    /// `AddressInUse`, `BindFailed` or socket option errors.
    pub async fn bind_addr(addr: SocketAddr) -> Result<Self> {
        Self::bind_with(addr, UdpOptions::default()).await
    }

    /// Binds with explicit socket options.
    ///
    /// # Errors
    /// `AddressInUse`, `BindFailed` or socket option errors.
    #[allow(clippy::unused_async)]
    pub async fn bind_with(addr: SocketAddr, options: UdpOptions) -> Result<Self> {
        debug!(%addr, ?options, "Binding UDP transport");

        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| TransportError::io("creating UDP socket", e))?;

        socket
            .set_reuse_address(options.reuse_address)
            .map_err(|e| TransportError::io("setting SO_REUSEADDR", e))?;
        if let Some(size) = options.recv_buffer_size {
            socket
                .set_recv_buffer_size(size)
                .map_err(|e| TransportError::io("setting SO_RCVBUF", e))?;
        }
        if let Some(size) = options.send_buffer_size {
            socket
                .set_send_buffer_size(size)
                .map_err(|e| TransportError::io("setting SO_SNDBUF", e))?;
        }
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::io("setting non-blocking", e))?;

        socket.bind(&addr.into()).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                TransportError::AddressInUse { addr }
            } else {
                TransportError::bind_failed(addr, e.to_string())
            }
        })?;

        let std_socket: std::net::UdpSocket = socket.into();
        let tokio_socket = UdpSocket::from_std(std_socket)
            .map_err(|e| TransportError::io("converting to Tokio socket", e))?;

        let local_addr = tokio_socket
            .local_addr()
            .map_err(|e| TransportError::io("getting local address", e))?;

        info!(%local_addr, "UDP transport bound");

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            socket: tokio_socket,
            local_addr,
            shutdown,
        })
    }

    /// Checks if the transport has been shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        let mut closed = self.shutdown.subscribe();
        if *closed.borrow_and_update() {
            return Err(TransportError::ShuttingDown);
        }

        tokio::select! {
            result = self.socket.recv_from(buf) => {
                let (len, addr) = result.map_err(|e| TransportError::ReceiveFailed {
                    reason: e.to_string(),
                })?;
                trace!(len, peer = %addr, "UDP datagram received");
                Ok((len, addr))
            }
            _ = closed.changed() => Err(TransportError::ShuttingDown),
        }
    }

    async fn send(&self, buf: &[u8], dest: &SocketAddr) -> Result<usize> {
        if self.is_shutdown() {
            return Err(TransportError::ShuttingDown);
        }
        if buf.len() > MAX_UDP_PAYLOAD {
            return Err(TransportError::DatagramTooLarge {
                size: buf.len(),
                max: MAX_UDP_PAYLOAD,
            });
        }

        let len = self
            .socket
            .send_to(buf, dest)
            .await
            .map_err(|e| TransportError::send_failed(*dest, e.to_string()))?;

        trace!(len, peer = %dest, "UDP datagram sent");
        Ok(len)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }

    async fn shutdown(&self) -> Result<()> {
        if self.shutdown.send_replace(true) {
            return Ok(());
        }
        info!(local_addr = %self.local_addr, "UDP transport shut down");
        Ok(())
    }

    fn is_active(&self) -> bool {
        !self.is_shutdown()
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("local_addr", &self.local_addr)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_bind_and_local_addr() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap();

        assert_eq!(addr.ip(), std::net::Ipv4Addr::LOCALHOST);
        assert!(addr.port() > 0);
    }

    #[tokio::test]
    async fn test_send_recv_loopback() {
        let server = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let client = UdpTransport::bind("127.0.0.1:0").await.unwrap();

        let server_addr = server.local_addr().unwrap();
        let client_addr = client.local_addr().unwrap();

        client.send(b"Hello, SSU!", &server_addr).await.unwrap();

        let mut buf = [0u8; 1024];
        let (len, source) = server.recv(&mut buf).await.unwrap();

        assert_eq!(&buf[..len], b"Hello, SSU!");
        assert_eq!(source, client_addr);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_pending_recv() {
        let transport = Arc::new(UdpTransport::bind("127.0.0.1:0").await.unwrap());
        let receiver = Arc::clone(&transport);
        let pending = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            receiver.recv(&mut buf).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        transport.shutdown().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .expect("recv did not wake")
            .unwrap();
        assert!(matches!(result, Err(TransportError::ShuttingDown)));
        assert!(!transport.is_active());

        let dest = transport.local_addr().unwrap();
        assert!(matches!(
            transport.send(b"x", &dest).await,
            Err(TransportError::ShuttingDown)
        ));
        // idempotent
        transport.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let result = UdpTransport::bind("not-an-address").await;
        assert!(matches!(result, Err(TransportError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn test_oversize_datagram_rejected() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let dest = transport.local_addr().unwrap();
        let big = vec![0u8; MAX_UDP_PAYLOAD + 1];
        assert!(matches!(
            transport.send(&big, &dest).await,
            Err(TransportError::DatagramTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_bind_with_buffer_options() {
        let options = UdpOptions {
            recv_buffer_size: Some(256 * 1024),
            ..UdpOptions::default()
        };
        let transport = UdpTransport::bind_with("127.0.0.1:0".parse().unwrap(), options)
            .await
            .unwrap();
        assert!(transport.is_active());
    }
}
