// ============================================
// File: crates/ssu-node/src/services/connection.rs
// ============================================
//! # Session Connection
//!
//! ## Creation Reason
//! What a finished handshake hands to the application: a datagram
//! session with read/write, deadlines and close, protected by the
//! derived session keys.
//!
//! ## Main Functionality
//! - `write`: split into Data datagrams, each sealed with the session keys
//! - `read`: next valid Data payload; leftovers kept for the next call
//! - Deadlines for read and write, observed by calls already blocked
//! - `close`: idempotent; zeroizes keys, releases the route, shuts the
//!   transport down only when the connection owns it
//!
//! ## Data Payload Layout
//! ```text
//! ┌──────────────┬────────────────────────┬──────────────────┐
//! │ length (u16) │ application bytes      │ datagram padding │
//! │ big-endian   │ (length bytes)         │ (0-15 bytes)     │
//! └──────────────┴────────────────────────┴──────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Semi-reliable: no acknowledgement, ordering or retransmission
//! - Forged, malformed and non-Data datagrams are dropped silently
//! - An initiator's SessionConfirmed stays held on the endpoint until the
//!   first datagram under the session keys proves the responder has it
//! - Closing unregisters the route, which ends the inbox and wakes a
//!   blocked `read` with `Closed`
//!
//! ## Last Modified
//! v0.1.0 - Initial session connection

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, trace};

use ssu_common::AtomicInstant;
use ssu_core::crypto::transport::{Datagram, MAX_PAYLOAD_SIZE};
use ssu_core::crypto::{DatagramCodec, SessionKeys};
use ssu_core::protocol::PayloadType;
use ssu_core::CoreError;

use crate::endpoint::Endpoint;
use crate::error::{NodeError, Result};
use crate::handlers::sleep_until_opt;
use crate::services::handshake::{Established, Role};

/// Length prefix in front of every Data payload.
pub const DATA_LENGTH_PREFIX: usize = 2;

/// Largest application chunk carried by one Data datagram.
pub const MAX_DATA_CHUNK: usize = MAX_PAYLOAD_SIZE - DATA_LENGTH_PREFIX;

struct Reader {
    inbox: mpsc::Receiver<Bytes>,
    leftover: Bytes,
}

// ============================================
// SessionConnection
// ============================================

/// An established SSU session with one peer.
///
/// All methods take `&self`; share it behind an `Arc` to read and write
/// from different tasks.
pub struct SessionConnection {
    keys: Mutex<Option<SessionKeys>>,
    codec: DatagramCodec,
    endpoint: Endpoint,
    owns_endpoint: bool,
    role: Role,
    peer: SocketAddr,
    local_addr: SocketAddr,
    relay_tag: u32,
    reader: tokio::sync::Mutex<Reader>,
    read_deadline: watch::Sender<Option<Instant>>,
    write_deadline: watch::Sender<Option<Instant>>,
    closed: AtomicBool,
    confirmation_settled: AtomicBool,
    last_activity: AtomicInstant,
}

impl SessionConnection {
    pub(crate) fn new(
        established: Established,
        endpoint: Endpoint,
        inbox: mpsc::Receiver<Bytes>,
        owns_endpoint: bool,
    ) -> Self {
        let Established {
            role,
            keys,
            peer,
            relay_tag,
            pending_confirmation,
        } = established;

        let confirmation_settled = match pending_confirmation {
            Some(pending) => {
                endpoint.hold_confirmation(peer, pending);
                false
            }
            None => true,
        };

        Self {
            keys: Mutex::new(Some(keys)),
            codec: DatagramCodec::new(),
            local_addr: endpoint.local_addr(),
            endpoint,
            owns_endpoint,
            role,
            peer,
            relay_tag,
            reader: tokio::sync::Mutex::new(Reader {
                inbox,
                leftover: Bytes::new(),
            }),
            read_deadline: watch::channel(None).0,
            write_deadline: watch::channel(None).0,
            closed: AtomicBool::new(false),
            confirmation_settled: AtomicBool::new(confirmation_settled),
            last_activity: AtomicInstant::now(),
        }
    }

    // ========================================
    // Accessors
    // ========================================

    /// Local transport address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Remote peer address.
    #[must_use]
    pub const fn remote_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Relay tag received in SessionCreated (0 for none).
    #[must_use]
    pub const fn relay_tag(&self) -> u32 {
        self.relay_tag
    }

    /// Role this side played in the handshake.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Time since the last datagram sent or accepted.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Returns `true` once `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    // ========================================
    // Deadlines
    // ========================================

    /// Sets both read and write deadlines. `None` disables them.
    pub fn set_deadline(&self, deadline: Option<Instant>) {
        self.set_read_deadline(deadline);
        self.set_write_deadline(deadline);
    }

    /// Sets the deadline for current and future reads.
    pub fn set_read_deadline(&self, deadline: Option<Instant>) {
        self.read_deadline.send_replace(deadline);
    }

    /// Sets the deadline for current and future writes.
    pub fn set_write_deadline(&self, deadline: Option<Instant>) {
        self.write_deadline.send_replace(deadline);
    }

    // ========================================
    // I/O
    // ========================================

    /// Reads the next application bytes into `buf`.
    ///
    /// Bytes that do not fit are returned by the following call.
    ///
    /// # Errors
    /// `Closed` after close or when the endpoint goes away; `Timeout` when
    /// the read deadline passes.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut reader = self.reader.lock().await;

        if reader.leftover.is_empty() {
            let data = with_deadline(&self.read_deadline, "read", self.next_data(&mut reader.inbox))
                .await??;
            reader.leftover = data;
        }

        let n = buf.len().min(reader.leftover.len());
        buf[..n].copy_from_slice(&reader.leftover.split_to(n));
        Ok(n)
    }

    /// Writes all of `buf`, one Data datagram per chunk.
    ///
    /// # Errors
    /// `Closed` after close; `Timeout` when the write deadline passes
    /// (earlier chunks may already be sent); transport errors.
    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut written = 0;
        for chunk in buf.chunks(MAX_DATA_CHUNK) {
            let wire = self.seal_chunk(chunk)?;
            with_deadline(
                &self.write_deadline,
                "write",
                self.endpoint.send_to(&wire, &self.peer),
            )
            .await??;
            written += chunk.len();
            self.last_activity.touch();
        }
        trace!(peer = %self.peer, written, "Data written");
        Ok(written)
    }

    /// Closes the connection. Idempotent.
    ///
    /// # Errors
    /// Transport shutdown errors when the connection owns the endpoint.
    pub async fn close(&self) -> Result<()> {
        if !self.release() {
            return Ok(());
        }
        debug!(peer = %self.peer, "Connection closed");
        if self.owns_endpoint {
            self.endpoint.shutdown().await?;
        }
        Ok(())
    }

    // ========================================
    // Internals
    // ========================================

    async fn next_data(&self, inbox: &mut mpsc::Receiver<Bytes>) -> Result<Bytes> {
        loop {
            let Some(wire) = inbox.recv().await else {
                return Err(NodeError::Closed);
            };
            if let Some(data) = self.open_data(&wire)? {
                self.last_activity.touch();
                return Ok(data);
            }
        }
    }

    /// Returns the application bytes of a valid Data datagram.
    fn open_data(&self, wire: &[u8]) -> Result<Option<Bytes>> {
        let datagram = {
            let keys = self.keys.lock();
            let Some(keys) = keys.as_ref() else {
                return Err(NodeError::Closed);
            };
            self.codec.open(keys, wire)
        };
        let datagram = match datagram {
            Ok(datagram) => datagram,
            Err(e) if e.is_suspicious() => {
                debug!(peer = %self.peer, error = %e, "Unauthenticated session datagram dropped");
                return Ok(None);
            }
            Err(e) => {
                trace!(peer = %self.peer, error = %e, "Session datagram dropped");
                return Ok(None);
            }
        };
        if !self.confirmation_settled.swap(true, Ordering::AcqRel) {
            self.endpoint.settle_confirmation(&self.peer);
        }
        if datagram.flag.payload_type != PayloadType::Data {
            trace!(
                peer = %self.peer,
                payload_type = %datagram.flag.payload_type,
                "Non-data datagram dropped"
            );
            return Ok(None);
        }

        let payload = datagram.payload;
        if payload.len() < DATA_LENGTH_PREFIX {
            return Ok(None);
        }
        let len = usize::from(u16::from_be_bytes([payload[0], payload[1]]));
        let end = DATA_LENGTH_PREFIX + len;
        if len == 0 || end > payload.len() {
            trace!(peer = %self.peer, len, "Data length prefix out of range");
            return Ok(None);
        }
        Ok(Some(payload.slice(DATA_LENGTH_PREFIX..end)))
    }

    fn seal_chunk(&self, chunk: &[u8]) -> Result<Bytes> {
        let len = u16::try_from(chunk.len()).map_err(|_| CoreError::PayloadTooLarge {
            max: MAX_DATA_CHUNK,
            actual: chunk.len(),
        })?;
        let mut payload = BytesMut::with_capacity(DATA_LENGTH_PREFIX + chunk.len());
        payload.put_u16(len);
        payload.put_slice(chunk);

        let keys = self.keys.lock();
        let Some(keys) = keys.as_ref() else {
            return Err(NodeError::Closed);
        };
        let datagram = Datagram::new(PayloadType::Data, payload.freeze());
        Ok(self.codec.seal(keys, &datagram)?)
    }

    /// Marks closed, drops the keys and the route. `false` if already done.
    fn release(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.keys.lock().take();
        self.endpoint.unregister(&self.peer);
        true
    }
}

impl Drop for SessionConnection {
    fn drop(&mut self) {
        if self.release() && self.owns_endpoint {
            self.endpoint.close();
        }
    }
}

impl std::fmt::Debug for SessionConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConnection")
            .field("local_addr", &self.local_addr)
            .field("remote_addr", &self.peer)
            .field("role", &self.role)
            .field("relay_tag", &self.relay_tag)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Runs `fut` until it completes or the deadline in `deadline` passes.
///
/// Deadline changes made while waiting take effect immediately.
async fn with_deadline<F: Future>(
    deadline: &watch::Sender<Option<Instant>>,
    operation: &'static str,
    fut: F,
) -> Result<F::Output> {
    let mut changes = deadline.subscribe();
    tokio::pin!(fut);

    loop {
        let current = *changes.borrow_and_update();
        if current.is_some_and(|at| at <= Instant::now()) {
            return Err(NodeError::Timeout { operation });
        }

        tokio::select! {
            out = &mut fut => return Ok(out),
            () = sleep_until_opt(current) => return Err(NodeError::Timeout { operation }),
            _ = changes.changed() => {}
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use ssu_transport::MemoryNetwork;

    use crate::config::HandshakeConfig;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], port))
    }

    fn keys() -> SessionKeys {
        SessionKeys::new([7u8; 32], [9u8; 32])
    }

    /// Two connections over an in-memory network sharing one set of keys.
    fn connected_pair(net: &MemoryNetwork) -> (SessionConnection, SessionConnection) {
        let config = HandshakeConfig::default();
        let a = Endpoint::with_transport(net.bind(addr(1)).unwrap(), &config).unwrap();
        let b = Endpoint::with_transport(net.bind(addr(2)).unwrap(), &config).unwrap();

        let a_inbox = a.register(addr(2)).unwrap();
        let b_inbox = b.register(addr(1)).unwrap();

        let conn = |role, peer, endpoint, inbox| {
            SessionConnection::new(
                Established {
                    role,
                    keys: keys(),
                    peer,
                    relay_tag: 7,
                    pending_confirmation: None,
                },
                endpoint,
                inbox,
                false,
            )
        };
        (
            conn(Role::Initiator, addr(2), a, a_inbox),
            conn(Role::Responder, addr(1), b, b_inbox),
        )
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let net = MemoryNetwork::new();
        let (alice, bob) = connected_pair(&net);

        assert_eq!(alice.write(b"hello bob").await.unwrap(), 9);
        let mut buf = [0u8; 64];
        let n = bob.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello bob");

        assert_eq!(alice.local_addr(), addr(1));
        assert_eq!(alice.remote_addr(), addr(2));
        assert_eq!(bob.relay_tag(), 7);
    }

    #[tokio::test]
    async fn test_partial_reads_keep_leftovers() {
        let net = MemoryNetwork::new();
        let (alice, bob) = connected_pair(&net);

        alice.write(b"abcdefgh").await.unwrap();
        let mut buf = [0u8; 3];
        let mut got = Vec::new();
        while got.len() < 8 {
            let n = bob.read(&mut buf).await.unwrap();
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, b"abcdefgh");
    }

    #[tokio::test]
    async fn test_large_write_is_chunked() {
        let net = MemoryNetwork::new();
        let (alice, bob) = connected_pair(&net);

        let data: Vec<u8> = (0..MAX_DATA_CHUNK + 100).map(|i| (i % 251) as u8).collect();
        assert_eq!(alice.write(&data).await.unwrap(), data.len());

        let mut got = Vec::new();
        let mut buf = vec![0u8; MAX_PAYLOAD_SIZE];
        while got.len() < data.len() {
            let n = bob.read(&mut buf).await.unwrap();
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, data);
    }

    #[tokio::test]
    async fn test_invalid_datagrams_are_skipped() {
        let net = MemoryNetwork::new();
        let (alice, bob) = connected_pair(&net);
        let codec = DatagramCodec::new();
        let k = keys();

        // Garbage, a non-Data type and a bad length prefix, then real data.
        net.inject(addr(1), addr(2), &[0u8; 48]);
        let destroyed = codec
            .seal(&k, &Datagram::new(PayloadType::SessionDestroyed, &b"\x00\x01x"[..]))
            .unwrap();
        net.inject(addr(1), addr(2), &destroyed);
        let overlong = codec
            .seal(&k, &Datagram::new(PayloadType::Data, &b"\xff\xffab"[..]))
            .unwrap();
        net.inject(addr(1), addr(2), &overlong);

        alice.write(b"real").await.unwrap();
        let mut buf = [0u8; 16];
        let n = bob.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"real");
    }

    #[tokio::test]
    async fn test_first_session_datagram_settles_confirmation() {
        let net = MemoryNetwork::new();
        let config = HandshakeConfig::default();
        let a = Endpoint::with_transport(net.bind(addr(1)).unwrap(), &config).unwrap();
        let inbox = a.register(addr(2)).unwrap();
        let alice = SessionConnection::new(
            Established {
                role: Role::Initiator,
                keys: keys(),
                peer: addr(2),
                relay_tag: 0,
                pending_confirmation: Some(crate::services::PendingConfirmation {
                    created: Bytes::from_static(b"created"),
                    confirmed: Bytes::from_static(b"confirmed"),
                    resends: 4,
                }),
            },
            a.clone(),
            inbox,
            false,
        );
        assert_eq!(a.pending_confirmations(), 1);

        // Garbage does not count as proof the responder is established.
        net.inject(addr(2), addr(1), &[0u8; 48]);
        let data = DatagramCodec::new()
            .seal(&keys(), &Datagram::new(PayloadType::Data, &b"\x00\x02hi"[..]))
            .unwrap();
        net.inject(addr(2), addr(1), &data);

        let mut buf = [0u8; 8];
        let n = alice.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hi");
        assert_eq!(a.pending_confirmations(), 0);
    }

    #[tokio::test]
    async fn test_read_deadline() {
        let net = MemoryNetwork::new();
        let (alice, bob) = connected_pair(&net);

        bob.set_read_deadline(Some(Instant::now() + Duration::from_millis(30)));
        let mut buf = [0u8; 8];
        let err = bob.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, NodeError::Timeout { operation: "read" }));

        // Past deadline fails immediately; clearing it lets reads proceed.
        bob.set_deadline(Some(Instant::now()));
        assert!(bob.read(&mut buf).await.unwrap_err().is_timeout());
        bob.set_deadline(None);
        alice.write(b"ok").await.unwrap();
        assert_eq!(bob.read(&mut buf).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_deadline_applies_to_blocked_read() {
        let net = MemoryNetwork::new();
        let (_alice, bob) = connected_pair(&net);
        let bob = std::sync::Arc::new(bob);

        let reader = std::sync::Arc::clone(&bob);
        let pending = tokio::spawn(async move {
            let mut buf = [0u8; 8];
            reader.read(&mut buf).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        bob.set_read_deadline(Some(Instant::now()));

        let result = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(NodeError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_unblocks_reads() {
        let net = MemoryNetwork::new();
        let (alice, bob) = connected_pair(&net);
        let bob = std::sync::Arc::new(bob);

        let reader = std::sync::Arc::clone(&bob);
        let pending = tokio::spawn(async move {
            let mut buf = [0u8; 8];
            reader.read(&mut buf).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        bob.close().await.unwrap();
        bob.close().await.unwrap();
        assert!(bob.is_closed());

        let result = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(NodeError::Closed)));
        assert!(matches!(bob.write(b"x").await, Err(NodeError::Closed)));

        // The foreign transport stays up for other users.
        assert!(alice.write(b"still here").await.is_ok());
        assert_eq!(bob.endpoint.route_count(), 0);
    }

    #[tokio::test]
    async fn test_owned_endpoint_shut_down_on_close() {
        let config = HandshakeConfig::default();
        let endpoint = Endpoint::bind("127.0.0.1:0".parse().unwrap(), &config)
            .await
            .unwrap();
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let inbox = endpoint.register(peer).unwrap();
        let conn = SessionConnection::new(
            Established {
                role: Role::Initiator,
                keys: keys(),
                peer,
                relay_tag: 0,
                pending_confirmation: None,
            },
            endpoint.clone(),
            inbox,
            true,
        );

        conn.close().await.unwrap();
        assert!(endpoint.is_closed());
        assert!(matches!(
            endpoint.send_to(b"x", &peer).await,
            Err(NodeError::ShuttingDown)
        ));
    }
}
