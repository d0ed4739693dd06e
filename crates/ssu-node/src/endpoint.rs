// ============================================
// File: crates/ssu-node/src/endpoint.rs
// ============================================
//! # Datagram Endpoint
//!
//! ## Creation Reason
//! One socket serves many peers: outbound dials, inbound handshakes and
//! established sessions. The endpoint owns the receive loop and routes
//! each datagram by source address.
//!
//! ## Main Functionality
//! - `Endpoint`: shared handle over a transport and its receive task
//! - Route table (`DashMap<SocketAddr, mpsc::Sender<Bytes>>`)
//! - Inbound queue for unknown sources, bounded by `max_pending`
//! - Pending confirmations: a dialed peer's SessionCreated retransmit is
//!   answered from the receive task, whether or not anyone is reading
//!
//! ## Endpoint Architecture
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Endpoint                          │
//! ├──────────────────────────────────────────────────────────┤
//! │  Receive Task                                            │
//! │    transport.recv()                                      │
//! │        │                                                 │
//! │        ├── recorded SessionCreated ──► resend confirmation│
//! │        │                                                 │
//! │        ├── known source ──► route inbox (handshake or    │
//! │        │                    SessionConnection)           │
//! │        │                                                 │
//! │        └── unknown source ─► Listener queue (if any,     │
//! │                              while pending < limit)      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Routing never blocks: a full inbox drops the datagram
//! - The route table holds the only sender for each inbox, so removing a
//!   route ends the reader's stream
//! - The transport is shut down only when the endpoint owns it
//!
//! ## Last Modified
//! v0.1.0 - Initial endpoint implementation

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use ssu_transport::{Transport, UdpTransport};

use crate::config::HandshakeConfig;
use crate::error::{NodeError, Result};
use crate::services::PendingConfirmation;

/// Datagrams buffered per peer before new ones are dropped.
pub const ROUTE_QUEUE_DEPTH: usize = 64;

/// Receive buffer size; larger than any UDP payload.
const RECV_BUFFER_SIZE: usize = 65_535;

// ============================================
// Inbound Handshakes
// ============================================

/// First datagram from a source the endpoint has no route for.
pub(crate) struct Incoming {
    /// Source address.
    pub peer: SocketAddr,
    /// Inbox that receives every later datagram from `peer`.
    pub inbox: mpsc::Receiver<Bytes>,
    /// The datagram that created the route.
    pub first: Bytes,
    /// Pending-slot reservation, released on drop.
    pub permit: PendingPermit,
}

/// Holds one of the endpoint's `max_pending` slots.
pub(crate) struct PendingPermit(Arc<AtomicUsize>);

impl Drop for PendingPermit {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

// ============================================
// Endpoint
// ============================================

/// A transport plus the task that demultiplexes it.
///
/// Cloning yields another handle to the same endpoint.
///
/// # Example
/// ```ignore
/// let endpoint = Endpoint::bind("0.0.0.0:8887".parse()?, &HandshakeConfig::default()).await?;
/// let conn = Dialer::new(config).dial_over(&endpoint, &peer).await?;
/// ```
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

struct EndpointInner {
    transport: Arc<dyn Transport>,
    local_addr: SocketAddr,
    owns_transport: bool,
    routes: DashMap<SocketAddr, mpsc::Sender<Bytes>>,
    confirmations: DashMap<SocketAddr, PendingConfirmation>,
    incoming: Mutex<Option<mpsc::Sender<Incoming>>>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
    closed: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Endpoint {
    /// Binds a UDP socket the endpoint owns.
    ///
    /// # Errors
    /// Transport bind errors.
    pub async fn bind(addr: SocketAddr, config: &HandshakeConfig) -> Result<Self> {
        let transport = UdpTransport::bind_addr(addr).await?;
        Self::start(Arc::new(transport), true, config.max_pending)
    }

    /// Runs over a caller-supplied transport, which is never shut down by
    /// the endpoint.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    /// If the transport cannot report its local address.
    pub fn with_transport(transport: Arc<dyn Transport>, config: &HandshakeConfig) -> Result<Self> {
        Self::start(transport, false, config.max_pending)
    }

    fn start(transport: Arc<dyn Transport>, owns_transport: bool, max_pending: usize) -> Result<Self> {
        let local_addr = transport.local_addr()?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let inner = Arc::new(EndpointInner {
            transport,
            local_addr,
            owns_transport,
            routes: DashMap::new(),
            confirmations: DashMap::new(),
            incoming: Mutex::new(None),
            pending: Arc::new(AtomicUsize::new(0)),
            max_pending,
            closed: AtomicBool::new(false),
            shutdown_tx,
            task: Mutex::new(None),
        });

        let task = tokio::spawn(EndpointInner::recv_loop(Arc::clone(&inner), shutdown_rx));
        *inner.task.lock() = Some(task);

        info!(%local_addr, owns_transport, "Endpoint started");
        Ok(Self { inner })
    }

    // ========================================
    // Accessors
    // ========================================

    /// Local transport address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Whether the endpoint shuts its transport down on close.
    #[must_use]
    pub fn owns_transport(&self) -> bool {
        self.inner.owns_transport
    }

    /// Number of peers with a route.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.inner.routes.len()
    }

    /// Inbound handshakes currently holding a pending slot.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Returns `true` once shutdown has started.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    // ========================================
    // Routing
    // ========================================

    /// Sends one datagram.
    ///
    /// # Errors
    /// `ShuttingDown` after shutdown, otherwise transport errors.
    pub async fn send_to(&self, buf: &[u8], dest: &SocketAddr) -> Result<usize> {
        if self.is_closed() {
            return Err(NodeError::ShuttingDown);
        }
        Ok(self.inner.transport.send(buf, dest).await?)
    }

    /// Claims `peer` and returns the inbox for its datagrams.
    ///
    /// # Errors
    /// `PeerBusy` if the peer already has a route, `ShuttingDown` after
    /// shutdown.
    pub fn register(&self, peer: SocketAddr) -> Result<mpsc::Receiver<Bytes>> {
        if self.is_closed() {
            return Err(NodeError::ShuttingDown);
        }
        match self.inner.routes.entry(peer) {
            Entry::Occupied(_) => Err(NodeError::PeerBusy { peer }),
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::channel(ROUTE_QUEUE_DEPTH);
                slot.insert(tx);
                trace!(%peer, "Route registered");
                Ok(rx)
            }
        }
    }

    /// Drops the route for `peer`, ending its inbox stream.
    pub fn unregister(&self, peer: &SocketAddr) {
        self.inner.confirmations.remove(peer);
        if self.inner.routes.remove(peer).is_some() {
            trace!(%peer, "Route removed");
        }
    }

    /// Answers `peer`'s SessionCreated retransmits with `pending.confirmed`
    /// until [`Endpoint::settle_confirmation`] or the resends run out.
    pub(crate) fn hold_confirmation(&self, peer: SocketAddr, pending: PendingConfirmation) {
        if pending.resends > 0 {
            self.inner.confirmations.insert(peer, pending);
        }
    }

    /// Forgets `peer`'s pending confirmation once the session is in use.
    pub(crate) fn settle_confirmation(&self, peer: &SocketAddr) {
        if self.inner.confirmations.remove(peer).is_some() {
            trace!(%peer, "Confirmation settled");
        }
    }

    /// Peers whose SessionConfirmed may still be resent.
    #[must_use]
    pub fn pending_confirmations(&self) -> usize {
        self.inner.confirmations.len()
    }

    /// Starts queueing datagrams from unknown sources.
    pub(crate) fn listen(&self) -> Result<mpsc::Receiver<Incoming>> {
        let mut incoming = self.inner.incoming.lock();
        if incoming.is_some() {
            return Err(NodeError::unsupported("more than one listener per endpoint"));
        }
        let (tx, rx) = mpsc::channel(self.inner.max_pending);
        *incoming = Some(tx);
        Ok(rx)
    }

    /// Stops queueing datagrams from unknown sources.
    pub(crate) fn stop_listening(&self) {
        self.inner.incoming.lock().take();
    }

    // ========================================
    // Shutdown
    // ========================================

    /// Signals the receive task to stop without waiting for it.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!(local_addr = %self.inner.local_addr, "Endpoint closing");
        self.stop_listening();
        self.inner.routes.clear();
        self.inner.confirmations.clear();
        let _ = self.inner.shutdown_tx.send(());
    }

    /// Stops the receive task and, if owned, the transport. Idempotent.
    ///
    /// # Errors
    /// Transport shutdown errors.
    pub async fn shutdown(&self) -> Result<()> {
        self.close();

        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            match tokio::time::timeout(Duration::from_secs(5), task).await {
                Ok(Ok(())) => debug!("Endpoint receive task completed"),
                Ok(Err(e)) => warn!("Endpoint receive task failed: {}", e),
                Err(_) => warn!("Endpoint receive task timed out during shutdown"),
            }
        }

        if self.inner.owns_transport {
            self.inner.transport.shutdown().await?;
        }
        Ok(())
    }
}

impl EndpointInner {
    async fn recv_loop(inner: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Endpoint task received shutdown signal");
                    break;
                }
                result = inner.transport.recv(&mut buf) => {
                    match result {
                        Ok((len, from)) => {
                            let datagram = &buf[..len];
                            if let Some(wire) = inner.answer_confirmation(from, datagram) {
                                if let Err(e) = inner.transport.send(&wire, &from).await {
                                    debug!(peer = %from, error = %e, "SessionConfirmed resend failed");
                                }
                                continue;
                            }
                            inner.dispatch(from, Bytes::copy_from_slice(datagram));
                        }
                        Err(e) if e.is_closed() => {
                            debug!("Transport closed under endpoint");
                            break;
                        }
                        Err(e) => {
                            if !inner.closed.load(Ordering::Acquire) {
                                warn!("Endpoint receive error: {}", e);
                            }
                        }
                    }
                }
            }
        }

        // Owned transports go down with the task so a plain `close()` also
        // releases the socket.
        if inner.owns_transport {
            if let Err(e) = inner.transport.shutdown().await {
                warn!("Transport shutdown error: {}", e);
            }
        }
        debug!(local_addr = %inner.local_addr, "Endpoint task exiting");
    }

    /// The SessionConfirmed to resend if `datagram` repeats the recorded
    /// SessionCreated from `from`.
    fn answer_confirmation(&self, from: SocketAddr, datagram: &[u8]) -> Option<Bytes> {
        let mut pending = self.confirmations.get_mut(&from)?;
        let wire = pending.answer(datagram);
        let exhausted = pending.resends == 0;
        drop(pending);

        if exhausted {
            self.confirmations.remove(&from);
        }
        if wire.is_some() {
            debug!(peer = %from, "Duplicate SessionCreated, resending SessionConfirmed");
        }
        wire
    }

    fn dispatch(&self, from: SocketAddr, datagram: Bytes) {
        let routed = self.routes.get(&from).map(|route| route.try_send(datagram.clone()));

        match routed {
            Some(Ok(())) => {}
            Some(Err(mpsc::error::TrySendError::Full(_))) => {
                trace!(peer = %from, "Inbox full, datagram dropped");
            }
            Some(Err(mpsc::error::TrySendError::Closed(_))) => {
                self.routes.remove(&from);
                trace!(peer = %from, "Inbox closed, route removed");
            }
            None => self.accept_unknown(from, datagram),
        }
    }

    fn accept_unknown(&self, from: SocketAddr, first: Bytes) {
        let Some(incoming) = self.incoming.lock().clone() else {
            trace!(peer = %from, "Datagram from unknown source dropped");
            return;
        };

        let Some(permit) = self.acquire_pending() else {
            debug!(peer = %from, limit = self.max_pending, "Pending handshake limit reached");
            return;
        };

        let Entry::Vacant(slot) = self.routes.entry(from) else {
            return;
        };
        let (tx, inbox) = mpsc::channel(ROUTE_QUEUE_DEPTH);
        let queued = incoming.try_send(Incoming {
            peer: from,
            inbox,
            first,
            permit,
        });
        if queued.is_ok() {
            slot.insert(tx);
            trace!(peer = %from, "Inbound handshake queued");
        } else {
            trace!(peer = %from, "Listener queue unavailable, datagram dropped");
        }
    }

    fn acquire_pending(&self) -> Option<PendingPermit> {
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_pending).then_some(n + 1)
            })
            .ok()
            .map(|_| PendingPermit(Arc::clone(&self.pending)))
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("local_addr", &self.inner.local_addr)
            .field("owns_transport", &self.inner.owns_transport)
            .field("routes", &self.inner.routes.len())
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
    use ssu_transport::MemoryNetwork;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], port))
    }

    fn config(max_pending: usize) -> HandshakeConfig {
        HandshakeConfig {
            max_pending,
            ..HandshakeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_routes_known_peer() {
        let net = MemoryNetwork::new();
        let endpoint = Endpoint::with_transport(net.bind(addr(1)).unwrap(), &config(4)).unwrap();
        let peer = net.bind(addr(2)).unwrap();

        let mut inbox = endpoint.register(addr(2)).unwrap();
        peer.send(b"hello", &addr(1)).await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), inbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&got[..], b"hello");
        assert!(matches!(
            endpoint.register(addr(2)),
            Err(NodeError::PeerBusy { .. })
        ));

        endpoint.unregister(&addr(2));
        assert!(inbox.recv().await.is_none());
        assert_eq!(endpoint.route_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_source_without_listener_is_dropped() {
        let net = MemoryNetwork::new();
        let endpoint = Endpoint::with_transport(net.bind(addr(1)).unwrap(), &config(4)).unwrap();
        let peer = net.bind(addr(2)).unwrap();

        peer.send(b"who?", &addr(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(endpoint.route_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_sources_queued_up_to_pending_limit() {
        let net = MemoryNetwork::new();
        let endpoint = Endpoint::with_transport(net.bind(addr(1)).unwrap(), &config(2)).unwrap();
        let mut incoming = endpoint.listen().unwrap();
        assert!(endpoint.listen().is_err());

        for port in 2..5 {
            let peer = net.bind(addr(port)).unwrap();
            peer.send(&[port as u8], &addr(1)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let first = incoming.recv().await.unwrap();
        assert_eq!(first.peer, addr(2));
        assert_eq!(&first.first[..], &[2]);
        let second = incoming.recv().await.unwrap();
        assert_eq!(second.peer, addr(3));
        assert!(incoming.try_recv().is_err());
        assert_eq!(endpoint.pending_count(), 2);

        drop(first);
        assert_eq!(endpoint.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_pending_confirmation_answered_without_reader() {
        let net = MemoryNetwork::new();
        let endpoint = Endpoint::with_transport(net.bind(addr(1)).unwrap(), &config(4)).unwrap();
        let peer = net.bind(addr(2)).unwrap();
        let mut inbox = endpoint.register(addr(2)).unwrap();

        endpoint.hold_confirmation(
            addr(2),
            PendingConfirmation {
                created: Bytes::from_static(b"created"),
                confirmed: Bytes::from_static(b"confirmed"),
                resends: 1,
            },
        );
        assert_eq!(endpoint.pending_confirmations(), 1);

        let mut buf = [0u8; 32];
        peer.send(b"created", &addr(1)).await.unwrap();
        let (n, _) = tokio::time::timeout(Duration::from_secs(1), peer.recv(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"confirmed");
        assert_eq!(endpoint.pending_confirmations(), 0);

        // Spent: the next copy is routed like any other datagram.
        peer.send(b"created", &addr(1)).await.unwrap();
        let routed = tokio::time::timeout(Duration::from_secs(1), inbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&routed[..], b"created");
    }

    #[tokio::test]
    async fn test_settled_confirmation_is_forgotten() {
        let net = MemoryNetwork::new();
        let endpoint = Endpoint::with_transport(net.bind(addr(1)).unwrap(), &config(4)).unwrap();
        let pending = PendingConfirmation {
            created: Bytes::from_static(b"c"),
            confirmed: Bytes::from_static(b"k"),
            resends: 3,
        };

        endpoint.hold_confirmation(addr(2), pending.clone());
        endpoint.settle_confirmation(&addr(2));
        assert_eq!(endpoint.pending_confirmations(), 0);

        endpoint.hold_confirmation(addr(3), pending);
        endpoint.unregister(&addr(3));
        assert_eq!(endpoint.pending_confirmations(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_respects_ownership() {
        let net = MemoryNetwork::new();
        let transport = net.bind(addr(1)).unwrap();
        let endpoint = Endpoint::with_transport(transport.clone(), &config(4)).unwrap();

        endpoint.shutdown().await.unwrap();
        endpoint.shutdown().await.unwrap();
        assert!(endpoint.is_closed());
        assert!(transport.is_active());
        assert!(matches!(
            endpoint.send_to(b"x", &addr(2)).await,
            Err(NodeError::ShuttingDown)
        ));
        assert!(matches!(
            endpoint.register(addr(2)),
            Err(NodeError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_owned_udp_endpoint_shuts_transport() {
        let endpoint = Endpoint::bind("127.0.0.1:0".parse().unwrap(), &config(4))
            .await
            .unwrap();
        assert!(endpoint.owns_transport());
        assert_ne!(endpoint.local_addr().port(), 0);
        endpoint.shutdown().await.unwrap();
        assert!(!endpoint.inner.transport.is_active());
    }
}
