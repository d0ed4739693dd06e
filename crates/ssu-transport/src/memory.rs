// ============================================
// File: crates/ssu-transport/src/memory.rs
// ============================================
//! # In-Memory Datagram Network
//!
//! ## Creation Reason
//! Lets handshake and session tests run without sockets: transports bound
//! on a shared `MemoryNetwork` exchange datagrams through in-memory queues.
//!
//! ## Main Functionality
//! - `MemoryNetwork`: address registry shared by all transports
//! - `MemoryTransport`: `Transport` implementation bound to one address
//! - Delivery filter to drop datagrams (loss, partitions)
//! - Raw injection of arbitrary bytes (forged datagrams)
//!
//! ## Usage in Tests
//! ```
//! use ssu_transport::{MemoryNetwork, Transport};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ssu_transport::Result<()> {
//! let net = MemoryNetwork::new();
//! let a = net.bind("10.0.0.1:1000".parse().unwrap())?;
//! let b = net.bind("10.0.0.2:2000".parse().unwrap())?;
//!
//! a.send(b"ping", &b.local_addr()?).await?;
//! let mut buf = [0u8; 16];
//! let (len, source) = b.recv(&mut buf).await?;
//! assert_eq!(&buf[..len], b"ping");
//! assert_eq!(source, a.local_addr()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This is for testing only - do not use in production
//! - Queues are bounded; overflow drops the newest datagram like a full
//!   socket buffer would
//! - Sending to an unbound address silently drops, as UDP does
//!
//! ## Last Modified
//! v0.1.0 - Initial in-memory network

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::Transport;

// ============================================
// Constants
// ============================================

/// Maximum number of datagrams queued per transport.
const MAX_QUEUE_SIZE: usize = 1024;

/// Decides whether a datagram from `src` to `dst` is delivered.
pub type DeliveryFilter = dyn Fn(&SocketAddr, &SocketAddr, &[u8]) -> bool + Send + Sync;

// ============================================
// Inbox
// ============================================

struct Inbox {
    queue: Mutex<VecDeque<(Vec<u8>, SocketAddr)>>,
    notify: Notify,
    closed: AtomicBool,
}

impl Inbox {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(64)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn push(&self, data: Vec<u8>, from: SocketAddr) -> bool {
        {
            let mut queue = self.queue.lock();
            if queue.len() >= MAX_QUEUE_SIZE {
                return false;
            }
            queue.push_back((data, from));
        }
        self.notify.notify_one();
        true
    }
}

// ============================================
// MemoryNetwork
// ============================================

struct NetworkInner {
    inboxes: Mutex<HashMap<SocketAddr, Arc<Inbox>>>,
    filter: Mutex<Option<Arc<DeliveryFilter>>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Shared in-memory datagram network.
#[derive(Clone)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryNetwork {
    /// Creates an empty network.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                inboxes: Mutex::new(HashMap::new()),
                filter: Mutex::new(None),
                delivered: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Binds a transport at `addr`.
    ///
    /// # Errors
    /// `AddressInUse` if a live transport already owns `addr`.
    pub fn bind(&self, addr: SocketAddr) -> Result<Arc<MemoryTransport>> {
        let inbox = Arc::new(Inbox::new());
        {
            let mut inboxes = self.inner.inboxes.lock();
            if inboxes.contains_key(&addr) {
                return Err(TransportError::AddressInUse { addr });
            }
            inboxes.insert(addr, Arc::clone(&inbox));
        }
        Ok(Arc::new(MemoryTransport {
            network: self.clone(),
            local_addr: addr,
            inbox,
        }))
    }

    /// Installs a delivery filter; `false` drops the datagram.
    pub fn set_filter<F>(&self, filter: F)
    where
        F: Fn(&SocketAddr, &SocketAddr, &[u8]) -> bool + Send + Sync + 'static,
    {
        *self.inner.filter.lock() = Some(Arc::new(filter));
    }

    /// Removes the delivery filter.
    pub fn clear_filter(&self) {
        *self.inner.filter.lock() = None;
    }

    /// Delivers raw bytes to `to` as if sent from `from`, bypassing the filter.
    ///
    /// Returns `false` if nothing is bound at `to` or its queue is full.
    pub fn inject(&self, from: SocketAddr, to: SocketAddr, data: &[u8]) -> bool {
        let inbox = self.inner.inboxes.lock().get(&to).cloned();
        inbox.is_some_and(|inbox| inbox.push(data.to_vec(), from))
    }

    /// Datagrams delivered so far.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.inner.delivered.load(Ordering::Relaxed)
    }

    /// Datagrams dropped by the filter, a full queue or a missing peer.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    fn route(&self, from: SocketAddr, to: SocketAddr, data: &[u8]) {
        let filter = self.inner.filter.lock().clone();
        if let Some(filter) = filter {
            if !filter(&from, &to, data) {
                trace!(src = %from, dst = %to, "Memory datagram filtered");
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        let inbox = self.inner.inboxes.lock().get(&to).cloned();
        let delivered = inbox.is_some_and(|inbox| inbox.push(data.to_vec(), from));
        if delivered {
            self.inner.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn unbind(&self, addr: &SocketAddr, inbox: &Arc<Inbox>) {
        let mut inboxes = self.inner.inboxes.lock();
        if inboxes.get(addr).is_some_and(|current| Arc::ptr_eq(current, inbox)) {
            inboxes.remove(addr);
        }
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("bound", &self.inner.inboxes.lock().len())
            .field("delivered", &self.delivered())
            .field("dropped", &self.dropped())
            .finish()
    }
}

// ============================================
// MemoryTransport
// ============================================

/// Transport bound to one address of a [`MemoryNetwork`].
pub struct MemoryTransport {
    network: MemoryNetwork,
    local_addr: SocketAddr,
    inbox: Arc<Inbox>,
}

impl MemoryTransport {
    /// Number of datagrams waiting to be received.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inbox.queue.lock().len()
    }

    fn is_closed(&self) -> bool {
        self.inbox.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        loop {
            let notified = self.inbox.notify.notified();
            if self.is_closed() {
                return Err(TransportError::ShuttingDown);
            }
            let next = self.inbox.queue.lock().pop_front();
            if let Some((data, from)) = next {
                // truncates like a short UDP receive buffer
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                return Ok((len, from));
            }
            notified.await;
        }
    }

    async fn send(&self, buf: &[u8], dest: &SocketAddr) -> Result<usize> {
        if self.is_closed() {
            return Err(TransportError::ShuttingDown);
        }
        self.network.route(self.local_addr, *dest, buf);
        Ok(buf.len())
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.local_addr)
    }

    async fn shutdown(&self) -> Result<()> {
        if !self.inbox.closed.swap(true, Ordering::AcqRel) {
            self.network.unbind(&self.local_addr, &self.inbox);
            self.inbox.notify.notify_waiters();
            trace!(local_addr = %self.local_addr, "Memory transport shut down");
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        !self.is_closed()
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.network.unbind(&self.local_addr, &self.inbox);
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("local_addr", &self.local_addr)
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_send_recv() {
        let net = MemoryNetwork::new();
        let a = net.bind(addr("10.0.0.1:1")).unwrap();
        let b = net.bind(addr("10.0.0.2:2")).unwrap();

        a.send(b"one", &addr("10.0.0.2:2")).await.unwrap();
        a.send(b"two", &addr("10.0.0.2:2")).await.unwrap();
        assert_eq!(b.pending(), 2);

        let mut buf = [0u8; 8];
        let (len, src) = b.recv(&mut buf).await.unwrap();
        assert_eq!((&buf[..len], src), (&b"one"[..], addr("10.0.0.1:1")));
        let (len, _) = b.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"two");
        assert_eq!(net.delivered(), 2);
    }

    #[tokio::test]
    async fn test_recv_waits_for_send() {
        let net = MemoryNetwork::new();
        let a = net.bind(addr("10.0.0.1:1")).unwrap();
        let b = net.bind(addr("10.0.0.2:2")).unwrap();

        let receiver = Arc::clone(&b);
        let pending = tokio::spawn(async move {
            let mut buf = [0u8; 8];
            receiver.recv(&mut buf).await.map(|(len, _)| buf[..len].to_vec())
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        a.send(b"late", &addr("10.0.0.2:2")).await.unwrap();

        assert_eq!(pending.await.unwrap().unwrap(), b"late".to_vec());
    }

    #[tokio::test]
    async fn test_unbound_destination_drops() {
        let net = MemoryNetwork::new();
        let a = net.bind(addr("10.0.0.1:1")).unwrap();
        assert_eq!(a.send(b"void", &addr("10.9.9.9:9")).await.unwrap(), 4);
        assert_eq!(net.dropped(), 1);
    }

    #[tokio::test]
    async fn test_filter_drops() {
        let net = MemoryNetwork::new();
        let a = net.bind(addr("10.0.0.1:1")).unwrap();
        let b = net.bind(addr("10.0.0.2:2")).unwrap();
        net.set_filter(|_, _, data| data != b"drop me");

        a.send(b"drop me", &addr("10.0.0.2:2")).await.unwrap();
        a.send(b"keep", &addr("10.0.0.2:2")).await.unwrap();
        assert_eq!(b.pending(), 1);
        assert_eq!(net.dropped(), 1);

        net.clear_filter();
        a.send(b"drop me", &addr("10.0.0.2:2")).await.unwrap();
        assert_eq!(b.pending(), 2);
    }

    #[tokio::test]
    async fn test_inject_and_address_in_use() {
        let net = MemoryNetwork::new();
        let b = net.bind(addr("10.0.0.2:2")).unwrap();
        assert!(matches!(
            net.bind(addr("10.0.0.2:2")),
            Err(TransportError::AddressInUse { .. })
        ));

        assert!(net.inject(addr("6.6.6.6:6"), addr("10.0.0.2:2"), b"forged"));
        let mut buf = [0u8; 8];
        let (len, src) = b.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"forged");
        assert_eq!(src, addr("6.6.6.6:6"));
    }

    #[tokio::test]
    async fn test_shutdown_wakes_and_unbinds() {
        let net = MemoryNetwork::new();
        let b = net.bind(addr("10.0.0.2:2")).unwrap();
        let receiver = Arc::clone(&b);
        let pending = tokio::spawn(async move {
            let mut buf = [0u8; 8];
            receiver.recv(&mut buf).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        b.shutdown().await.unwrap();
        assert!(matches!(pending.await.unwrap(), Err(TransportError::ShuttingDown)));
        assert!(!b.is_active());

        // address is free again
        assert!(net.bind(addr("10.0.0.2:2")).is_ok());
    }
}
