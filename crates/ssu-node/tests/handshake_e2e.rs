//! Full handshakes through the public dial/listen API, over loopback UDP
//! and the in-memory network.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use ssu_core::crypto::{IdentityKeyPair, IntroKey};
use ssu_core::protocol::{ConfirmationCodec, ConfirmationContext};
use ssu_core::CoreError;
use ssu_node::{
    Dialer, Endpoint, HandshakeConfig, HandshakeState, Listener, ListenerOptions, NodeError,
    RemotePeer, Role,
};
use ssu_transport::MemoryNetwork;

// ============================================
// Fixtures
// ============================================

/// Binds both DH values and the relay tag into the third message.
struct TestConfirmation;

const MARKER: &[u8] = b"ssu-test";

impl ConfirmationCodec for TestConfirmation {
    fn encode(&self, ctx: &ConfirmationContext<'_>) -> ssu_core::Result<Bytes> {
        let mut out = MARKER.to_vec();
        out.extend_from_slice(&ctx.x[..16]);
        out.extend_from_slice(&ctx.y[..16]);
        out.extend_from_slice(&ctx.relay_tag.to_be_bytes());
        Ok(Bytes::from(out))
    }

    fn verify(&self, ctx: &ConfirmationContext<'_>, payload: &[u8]) -> ssu_core::Result<()> {
        let expected = self.encode(ctx)?;
        if payload.len() < expected.len() || !payload.starts_with(MARKER) {
            return Err(CoreError::malformed("not a test confirmation"));
        }
        if payload[..expected.len()] != expected[..] {
            return Err(CoreError::SignatureVerification);
        }
        Ok(())
    }
}

struct Responder {
    identity: Arc<IdentityKeyPair>,
    intro_key: IntroKey,
}

impl Responder {
    fn new() -> Self {
        Self {
            identity: Arc::new(IdentityKeyPair::generate()),
            intro_key: IntroKey::generate(),
        }
    }

    fn options(&self, config: &HandshakeConfig) -> ListenerOptions {
        ListenerOptions::new(self.identity.clone(), self.intro_key.clone())
            .with_confirmation(Arc::new(TestConfirmation))
            .with_config(config.clone())
    }

    fn peer(&self, addr: SocketAddr) -> RemotePeer {
        RemotePeer::new(addr, self.intro_key.clone(), self.identity.public_key())
    }
}

fn fast_config() -> HandshakeConfig {
    HandshakeConfig {
        retransmit_interval_ms: 50,
        max_attempts: 4,
        timeout_secs: 5,
        ..HandshakeConfig::default()
    }
}

fn dialer(config: &HandshakeConfig) -> Dialer {
    Dialer::new(config.clone()).with_confirmation(Arc::new(TestConfirmation))
}

fn mem_addr(host: u8, port: u16) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, host], port))
}

fn endpoint(net: &MemoryNetwork, addr: SocketAddr, config: &HandshakeConfig) -> Endpoint {
    Endpoint::with_transport(net.bind(addr).unwrap(), config).unwrap()
}

async fn read_some(conn: &ssu_node::SessionConnection) -> Vec<u8> {
    let mut buf = [0u8; 1024];
    conn.set_read_deadline(Some(Instant::now() + Duration::from_secs(2)));
    let n = conn.read(&mut buf).await.unwrap();
    buf[..n].to_vec()
}

// ============================================
// Establishment
// ============================================

#[tokio::test]
async fn test_udp_loopback_session() {
    let config = fast_config();
    let bob = Responder::new();
    let mut listener = Listener::bind("127.0.0.1:0".parse().unwrap(), bob.options(&config))
        .await
        .unwrap();
    let bob_addr = listener.local_addr();

    let accept = tokio::spawn(async move {
        let conn = listener.accept().await.unwrap();
        (listener, conn)
    });

    let alice = dialer(&config).dial(&bob.peer(bob_addr)).await.unwrap();
    let (_listener, bob_conn) = accept.await.unwrap();

    assert_eq!(alice.role(), Role::Initiator);
    assert_eq!(bob_conn.role(), Role::Responder);
    assert_eq!(alice.remote_addr(), bob_addr);
    assert_eq!(bob_conn.remote_addr().port(), alice.local_addr().port());

    alice.write(b"ping over udp").await.unwrap();
    assert_eq!(read_some(&bob_conn).await, b"ping over udp");
    bob_conn.write(b"pong").await.unwrap();
    assert_eq!(read_some(&alice).await, b"pong");

    alice.close().await.unwrap();
    bob_conn.close().await.unwrap();
}

#[tokio::test]
async fn test_memory_session_with_relay_tag() {
    let net = MemoryNetwork::new();
    let config = HandshakeConfig {
        offer_relay_tag: true,
        ..fast_config()
    };
    let bob = Responder::new();
    let bob_endpoint = endpoint(&net, mem_addr(2, 8887), &config);
    let alice_endpoint = endpoint(&net, mem_addr(1, 40000), &config);

    let mut listener = Listener::over(&bob_endpoint, bob.options(&config)).unwrap();
    let alice = dialer(&config)
        .dial_over(&alice_endpoint, &bob.peer(mem_addr(2, 8887)))
        .await
        .unwrap();
    let bob_conn = listener.accept().await.unwrap();

    assert_ne!(alice.relay_tag(), 0);
    assert_eq!(alice.relay_tag(), bob_conn.relay_tag());
    assert_eq!(bob_conn.remote_addr(), mem_addr(1, 40000));

    let big: Vec<u8> = (0..50_000u32).map(|i| (i % 256) as u8).collect();
    alice.write(&big).await.unwrap();
    let mut got = Vec::new();
    while got.len() < big.len() {
        got.extend(read_some(&bob_conn).await);
    }
    assert_eq!(got, big);
}

#[tokio::test]
async fn test_concurrent_dialers_share_listener() {
    let net = MemoryNetwork::new();
    let config = fast_config();
    let bob = Responder::new();
    let bob_addr = mem_addr(2, 8887);
    let bob_endpoint = endpoint(&net, bob_addr, &config);
    let mut listener = Listener::over(&bob_endpoint, bob.options(&config)).unwrap();

    let mut dials = Vec::new();
    for host in 10..13 {
        let ep = endpoint(&net, mem_addr(host, 5000), &config);
        let peer = bob.peer(bob_addr);
        let initiator = dialer(&config);
        dials.push(tokio::spawn(async move {
            let conn = initiator.dial_over(&ep, &peer).await.unwrap();
            conn.write(&[host]).await.unwrap();
            conn
        }));
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        let conn = listener.accept().await.unwrap();
        let data = read_some(&conn).await;
        assert_eq!(conn.remote_addr(), mem_addr(data[0], 5000));
        seen.push(data[0]);
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![10, 11, 12]);

    for dial in dials {
        dial.await.unwrap();
    }
}

// ============================================
// Loss and Forgery
// ============================================

#[tokio::test]
async fn test_lost_session_created_is_retransmitted() {
    let net = MemoryNetwork::new();
    let config = fast_config();
    let bob = Responder::new();
    let (alice_addr, bob_addr) = (mem_addr(1, 40000), mem_addr(2, 8887));

    let from_bob = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&from_bob);
    net.set_filter(move |from, _to, _data| {
        *from != bob_addr || counter.fetch_add(1, Ordering::SeqCst) > 0
    });

    let bob_endpoint = endpoint(&net, bob_addr, &config);
    let alice_endpoint = endpoint(&net, alice_addr, &config);
    let mut listener = Listener::over(&bob_endpoint, bob.options(&config)).unwrap();

    let alice = dialer(&config)
        .dial_over(&alice_endpoint, &bob.peer(bob_addr))
        .await
        .unwrap();
    let _bob_conn = listener.accept().await.unwrap();

    assert!(from_bob.load(Ordering::SeqCst) >= 2);
    assert!(net.dropped() >= 1);
    assert!(!alice.is_closed());
}

#[tokio::test]
async fn test_lost_session_confirmed_is_resent() {
    let net = MemoryNetwork::new();
    let config = fast_config();
    let bob = Responder::new();
    let (alice_addr, bob_addr) = (mem_addr(1, 40000), mem_addr(2, 8887));

    // Alice's second datagram is her SessionConfirmed.
    let from_alice = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&from_alice);
    net.set_filter(move |from, _to, _data| {
        *from != alice_addr || counter.fetch_add(1, Ordering::SeqCst) != 1
    });

    let bob_endpoint = endpoint(&net, bob_addr, &config);
    let alice_endpoint = endpoint(&net, alice_addr, &config);
    let mut listener = Listener::over(&bob_endpoint, bob.options(&config)).unwrap();

    // Nobody reads on alice's side; the endpoint answers the retransmit.
    let alice = dialer(&config)
        .dial_over(&alice_endpoint, &bob.peer(bob_addr))
        .await
        .unwrap();
    let bob_conn = tokio::time::timeout(Duration::from_secs(3), listener.accept())
        .await
        .unwrap()
        .unwrap();

    assert!(from_alice.load(Ordering::SeqCst) >= 3);
    assert!(net.dropped() >= 1);
    assert_eq!(bob_conn.remote_addr(), alice_addr);

    alice.write(b"after a lost confirmation").await.unwrap();
    assert_eq!(read_some(&bob_conn).await, b"after a lost confirmation");
    bob_conn.write(b"ack").await.unwrap();
    assert_eq!(read_some(&alice).await, b"ack");
    assert_eq!(alice_endpoint.pending_confirmations(), 0);
}

#[tokio::test]
async fn test_forged_datagrams_do_not_disturb_session() {
    let net = MemoryNetwork::new();
    let config = fast_config();
    let bob = Responder::new();
    let (alice_addr, bob_addr) = (mem_addr(1, 40000), mem_addr(2, 8887));
    let bob_endpoint = endpoint(&net, bob_addr, &config);
    let alice_endpoint = endpoint(&net, alice_addr, &config);
    let mut listener = Listener::over(&bob_endpoint, bob.options(&config)).unwrap();

    let alice = dialer(&config)
        .dial_over(&alice_endpoint, &bob.peer(bob_addr))
        .await
        .unwrap();
    let bob_conn = listener.accept().await.unwrap();

    for len in [0usize, 31, 48, 200] {
        net.inject(alice_addr, bob_addr, &vec![0xA5; len]);
    }
    alice.write(b"authentic").await.unwrap();
    assert_eq!(read_some(&bob_conn).await, b"authentic");
}

// ============================================
// Failures
// ============================================

#[tokio::test]
async fn test_unimplemented_confirmation_fails_cleanly() {
    let net = MemoryNetwork::new();
    let config = fast_config();
    let bob = Responder::new();
    let bob_addr = mem_addr(2, 8887);
    let bob_endpoint = endpoint(&net, bob_addr, &config);
    let alice_endpoint = endpoint(&net, mem_addr(1, 40000), &config);
    let _listener = Listener::over(&bob_endpoint, bob.options(&config)).unwrap();

    let err = Dialer::new(config)
        .dial_over(&alice_endpoint, &bob.peer(bob_addr))
        .await
        .unwrap_err();

    match err {
        NodeError::Handshake { state, reason, .. } => {
            assert_eq!(state, HandshakeState::CreatedReceived);
            assert!(reason.contains("SessionConfirmed"), "{reason}");
        }
        other => panic!("expected handshake failure, got {other:?}"),
    }
    assert_eq!(alice_endpoint.route_count(), 0);
}

#[tokio::test]
async fn test_wrong_identity_is_rejected() {
    let net = MemoryNetwork::new();
    let config = fast_config();
    let bob = Responder::new();
    let bob_addr = mem_addr(2, 8887);
    let bob_endpoint = endpoint(&net, bob_addr, &config);
    let alice_endpoint = endpoint(&net, mem_addr(1, 40000), &config);
    let _listener = Listener::over(&bob_endpoint, bob.options(&config)).unwrap();

    let impostor = RemotePeer::new(
        bob_addr,
        bob.intro_key.clone(),
        IdentityKeyPair::generate().public_key(),
    );
    let err = dialer(&config)
        .dial_over(&alice_endpoint, &impostor)
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::Handshake { .. }), "{err:?}");
}

#[tokio::test]
async fn test_wrong_intro_key_times_out() {
    let net = MemoryNetwork::new();
    let config = HandshakeConfig {
        retransmit_interval_ms: 20,
        max_attempts: 3,
        ..fast_config()
    };
    let bob = Responder::new();
    let bob_addr = mem_addr(2, 8887);
    let bob_endpoint = endpoint(&net, bob_addr, &config);
    let alice_endpoint = endpoint(&net, mem_addr(1, 40000), &config);
    let _listener = Listener::over(&bob_endpoint, bob.options(&config)).unwrap();

    let wrong = RemotePeer::new(bob_addr, IntroKey::generate(), bob.identity.public_key());
    let err = dialer(&config)
        .dial_over(&alice_endpoint, &wrong)
        .await
        .unwrap_err();

    assert!(matches!(err, NodeError::HandshakeTimeout { .. }), "{err:?}");
    assert_eq!(bob_endpoint.pending_count(), 0);
}

// ============================================
// Deadlines and Close
// ============================================

#[tokio::test]
async fn test_read_deadline_and_close() {
    let net = MemoryNetwork::new();
    let config = fast_config();
    let bob = Responder::new();
    let bob_addr = mem_addr(2, 8887);
    let bob_endpoint = endpoint(&net, bob_addr, &config);
    let alice_endpoint = endpoint(&net, mem_addr(1, 40000), &config);
    let mut listener = Listener::over(&bob_endpoint, bob.options(&config)).unwrap();

    let alice = dialer(&config)
        .dial_over(&alice_endpoint, &bob.peer(bob_addr))
        .await
        .unwrap();
    let bob_conn = listener.accept().await.unwrap();

    alice.set_read_deadline(Some(Instant::now() + Duration::from_millis(50)));
    let mut buf = [0u8; 16];
    assert!(matches!(
        alice.read(&mut buf).await,
        Err(NodeError::Timeout { .. })
    ));

    // Closing a connection over a shared endpoint leaves the endpoint up.
    alice.close().await.unwrap();
    alice.close().await.unwrap();
    assert!(matches!(alice.write(b"late").await, Err(NodeError::Closed)));
    assert!(!alice_endpoint.is_closed());
    assert_eq!(alice_endpoint.route_count(), 0);

    // The peer notices nothing; there is no teardown message.
    assert!(!bob_conn.is_closed());
    listener.close().await.unwrap();
    assert!(!bob_endpoint.is_closed());
}
