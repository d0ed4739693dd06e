// ============================================
// File: crates/ssu-node/src/handlers/handshake.rs
// ============================================
//! # Handshake Driver
//!
//! ## Creation Reason
//! Runs a `HandshakeSession` against a real endpoint: sends what the
//! machine produces, waits for either a routed reply or the
//! retransmission timer, and enforces the overall deadline.
//!
//! ## Driver Loop
//! ```text
//!   start() / first datagram
//!            │
//!            ▼
//!   ┌──── select! ──────────────────────┐
//!   │  inbox.recv()    retransmit timer │
//!   │      │                 │          │
//!   │  handle_datagram   on_timeout     │
//!   │      │                 │          │
//!   │  Reply → send      Some → resend  │
//!   │  Complete → done   None → TimedOut│
//!   └───────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Dropping the returned future cancels the handshake; the session and
//!   its key material are dropped with it
//! - Retryable send errors are logged and left to the retransmit timer
//!
//! ## Last Modified
//! v0.1.0 - Initial handshake driver

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::endpoint::Endpoint;
use crate::error::{NodeError, Result};
use crate::handlers::sleep_until_opt;
use crate::services::handshake::{Established, HandshakeSession, HandshakeState, Step};

/// Drives `session` to completion.
///
/// Initiators pass `first = None` and the driver calls `start()`;
/// responders pass the datagram that created their route.
///
/// # Errors
/// - `Handshake` if the machine fails
/// - `HandshakeTimeout` on retry exhaustion or the overall `timeout`
/// - `ShuttingDown` if the endpoint closes the inbox
pub async fn drive(
    mut session: HandshakeSession,
    endpoint: &Endpoint,
    inbox: &mut mpsc::Receiver<Bytes>,
    first: Option<Bytes>,
    timeout: Duration,
) -> Result<Established> {
    let peer = session.peer();
    let role = session.role();

    let outcome = tokio::time::timeout(timeout, exchange(&mut session, endpoint, inbox, first)).await;

    match outcome {
        Ok(Ok(())) => {
            let state = session.state();
            let established = session
                .into_established()
                .ok_or_else(|| NodeError::handshake(peer, state, "finished without session keys"))?;
            info!(%peer, ?role, relay_tag = established.relay_tag, "Session established");
            Ok(established)
        }
        Ok(Err(e)) => {
            session.cancel();
            debug!(%peer, ?role, error = %e, "Handshake aborted");
            Err(e)
        }
        Err(_) => {
            session.cancel();
            debug!(%peer, ?role, "Handshake deadline expired");
            Err(NodeError::HandshakeTimeout { peer })
        }
    }
}

async fn exchange(
    session: &mut HandshakeSession,
    endpoint: &Endpoint,
    inbox: &mut mpsc::Receiver<Bytes>,
    first: Option<Bytes>,
) -> Result<()> {
    let peer = session.peer();

    match first {
        None => {
            let wire = session.start()?;
            send(endpoint, &wire, &peer).await?;
        }
        Some(datagram) => {
            if feed(session, endpoint, &datagram).await? {
                return Ok(());
            }
            if session.state() == HandshakeState::Idle {
                return Err(NodeError::handshake(
                    peer,
                    HandshakeState::Idle,
                    "first datagram was not a valid SessionRequest",
                ));
            }
        }
    }

    loop {
        let retransmit_at = session.retransmit_at();
        tokio::select! {
            datagram = inbox.recv() => {
                let Some(datagram) = datagram else {
                    return Err(NodeError::ShuttingDown);
                };
                if feed(session, endpoint, &datagram).await? {
                    return Ok(());
                }
            }
            () = sleep_until_opt(retransmit_at) => {
                match session.on_timeout() {
                    Some(wire) => send(endpoint, &wire, &peer).await?,
                    None => return Err(NodeError::HandshakeTimeout { peer }),
                }
            }
        }
    }
}

/// Feeds one datagram; returns `true` once established.
async fn feed(session: &mut HandshakeSession, endpoint: &Endpoint, datagram: &[u8]) -> Result<bool> {
    let peer = session.peer();
    match session.handle_datagram(datagram)? {
        Step::Discarded => Ok(false),
        Step::Reply(wire) => {
            send(endpoint, &wire, &peer).await?;
            Ok(false)
        }
        Step::Complete(wire) => {
            if let Some(wire) = wire {
                send(endpoint, &wire, &peer).await?;
            }
            Ok(true)
        }
    }
}

async fn send(endpoint: &Endpoint, wire: &[u8], peer: &SocketAddr) -> Result<()> {
    match endpoint.send_to(wire, peer).await {
        Ok(_) => Ok(()),
        Err(NodeError::Transport(e)) if e.is_retryable() => {
            warn!(%peer, error = %e, "Handshake send failed, waiting for retransmit");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ssu_core::crypto::{Ed25519Verifier, IdentityKeyPair, IntroKey};
    use ssu_core::protocol::UnimplementedConfirmation;
    use ssu_transport::MemoryNetwork;

    use crate::config::HandshakeConfig;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], port))
    }

    fn fast_config() -> HandshakeConfig {
        HandshakeConfig {
            retransmit_interval_ms: 20,
            max_attempts: 3,
            timeout_secs: 5,
            ..HandshakeConfig::default()
        }
    }

    fn initiator(config: &HandshakeConfig) -> HandshakeSession {
        HandshakeSession::initiator(
            addr(2),
            addr(1),
            IntroKey::generate(),
            Arc::new(Ed25519Verifier::new(IdentityKeyPair::generate().public_key())),
            Arc::new(UnimplementedConfirmation),
            config,
        )
    }

    #[tokio::test]
    async fn test_silent_peer_exhausts_retries() {
        let net = MemoryNetwork::new();
        let config = fast_config();
        let endpoint = Endpoint::with_transport(net.bind(addr(1)).unwrap(), &config).unwrap();
        let silent = net.bind(addr(2)).unwrap();

        let mut inbox = endpoint.register(addr(2)).unwrap();
        let err = drive(initiator(&config), &endpoint, &mut inbox, None, config.timeout())
            .await
            .unwrap_err();

        assert!(matches!(err, NodeError::HandshakeTimeout { .. }));
        assert_eq!(silent.pending(), 3);
    }

    #[tokio::test]
    async fn test_overall_deadline() {
        let net = MemoryNetwork::new();
        let config = HandshakeConfig {
            retransmit_interval_ms: 10_000,
            ..fast_config()
        };
        let endpoint = Endpoint::with_transport(net.bind(addr(1)).unwrap(), &config).unwrap();
        let _silent = net.bind(addr(2)).unwrap();

        let mut inbox = endpoint.register(addr(2)).unwrap();
        let err = drive(
            initiator(&config),
            &endpoint,
            &mut inbox,
            None,
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_closed_inbox_reports_shutdown() {
        let net = MemoryNetwork::new();
        let config = HandshakeConfig {
            retransmit_interval_ms: 10_000,
            ..fast_config()
        };
        let endpoint = Endpoint::with_transport(net.bind(addr(1)).unwrap(), &config).unwrap();
        let _peer = net.bind(addr(2)).unwrap();

        let mut inbox = endpoint.register(addr(2)).unwrap();
        let closer = endpoint.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.unregister(&addr(2));
        });

        let err = drive(initiator(&config), &endpoint, &mut inbox, None, config.timeout())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::ShuttingDown));
    }

    #[tokio::test]
    async fn test_responder_rejects_garbage_first_datagram() {
        let net = MemoryNetwork::new();
        let config = fast_config();
        let endpoint = Endpoint::with_transport(net.bind(addr(1)).unwrap(), &config).unwrap();

        let session = HandshakeSession::responder(
            addr(2),
            addr(1),
            IntroKey::generate(),
            Arc::new(IdentityKeyPair::generate()),
            Arc::new(UnimplementedConfirmation),
            &config,
        );
        let mut inbox = endpoint.register(addr(2)).unwrap();
        let err = drive(
            session,
            &endpoint,
            &mut inbox,
            Some(Bytes::from_static(&[0u8; 64])),
            config.timeout(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            NodeError::Handshake {
                state: HandshakeState::Idle,
                ..
            }
        ));
        assert_eq!(endpoint.route_count(), 1);
    }
}
