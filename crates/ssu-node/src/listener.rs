// ============================================
// File: crates/ssu-node/src/listener.rs
// ============================================
//! # Listener
//!
//! ## Creation Reason
//! Responder entry point: accepts SessionRequests arriving on an
//! endpoint and hands out established [`SessionConnection`]s.
//!
//! ## Main Functionality
//! ```text
//!  Endpoint ──Incoming──► accept task ──spawn──► responder driver
//!                                                     │
//!                          accept() ◄──established────┘
//! ```
//! - One responder driver per unknown source, capped by `max_pending`
//! - Failed handshakes release the peer's route immediately
//! - Closing the listener aborts in-flight handshakes
//!
//! ## ⚠️ Important Note for Next Developer
//! - Connections handed out by a listener never own the endpoint; the
//!   listener does when it was created with [`Listener::bind`]
//! - Accepted connections outlive the listener only over a foreign
//!   endpoint; closing an owned endpoint ends their inboxes
//!
//! ## Last Modified
//! v0.1.0 - Initial listener

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info};

use ssu_core::crypto::{HandshakeSigner, IntroKey};
use ssu_core::protocol::{ConfirmationCodec, UnimplementedConfirmation};

use crate::config::HandshakeConfig;
use crate::endpoint::{Endpoint, Incoming};
use crate::error::{NodeError, Result};
use crate::handlers;
use crate::services::{HandshakeSession, SessionConnection};

/// Established connections waiting for `accept`.
pub const ACCEPT_BACKLOG: usize = 128;

// ============================================
// ListenerOptions
// ============================================

/// Responder identity and handshake settings.
#[derive(Clone)]
pub struct ListenerOptions {
    signer: Arc<dyn HandshakeSigner>,
    intro_key: IntroKey,
    confirmation: Arc<dyn ConfirmationCodec>,
    config: HandshakeConfig,
}

impl ListenerOptions {
    /// Options with default handshake settings and no confirmation codec.
    #[must_use]
    pub fn new(signer: Arc<dyn HandshakeSigner>, intro_key: IntroKey) -> Self {
        Self {
            signer,
            intro_key,
            confirmation: Arc::new(UnimplementedConfirmation),
            config: HandshakeConfig::default(),
        }
    }

    /// Installs the SessionConfirmed codec.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: Arc<dyn ConfirmationCodec>) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// Replaces the handshake settings.
    #[must_use]
    pub fn with_config(mut self, config: HandshakeConfig) -> Self {
        self.config = config;
        self
    }

    fn responder(&self, peer: SocketAddr, local: SocketAddr) -> HandshakeSession {
        HandshakeSession::responder(
            peer,
            local,
            self.intro_key.clone(),
            Arc::clone(&self.signer),
            Arc::clone(&self.confirmation),
            &self.config,
        )
    }
}

impl std::fmt::Debug for ListenerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerOptions")
            .field("intro_key", &self.intro_key)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ============================================
// Listener
// ============================================

/// Accepts inbound SSU sessions on one endpoint.
pub struct Listener {
    endpoint: Endpoint,
    owns_endpoint: bool,
    accepted: mpsc::Receiver<SessionConnection>,
    task: Option<JoinHandle<()>>,
}

impl Listener {
    /// Binds a UDP endpoint owned by the listener.
    ///
    /// # Errors
    /// Bind failures.
    pub async fn bind(addr: SocketAddr, options: ListenerOptions) -> Result<Self> {
        let endpoint = Endpoint::bind(addr, &options.config).await?;
        Self::start(endpoint, true, options)
    }

    /// Listens on an existing endpoint, leaving it running on close.
    ///
    /// # Errors
    /// `Unsupported` if the endpoint already has a listener.
    pub fn over(endpoint: &Endpoint, options: ListenerOptions) -> Result<Self> {
        Self::start(endpoint.clone(), false, options)
    }

    fn start(endpoint: Endpoint, owns_endpoint: bool, options: ListenerOptions) -> Result<Self> {
        let incoming = endpoint.listen()?;
        let (tx, accepted) = mpsc::channel(ACCEPT_BACKLOG);

        info!(local_addr = %endpoint.local_addr(), "Listening for SSU sessions");
        let task = tokio::spawn(accept_loop(endpoint.clone(), Arc::new(options), incoming, tx));

        Ok(Self {
            endpoint,
            owns_endpoint,
            accepted,
            task: Some(task),
        })
    }

    /// Local transport address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.endpoint.local_addr()
    }

    /// The endpoint sessions are accepted on.
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Waits for the next established session.
    ///
    /// # Errors
    /// `Closed` once the listener or its endpoint has shut down.
    pub async fn accept(&mut self) -> Result<SessionConnection> {
        self.accepted.recv().await.ok_or(NodeError::Closed)
    }

    /// Stops accepting and aborts in-flight handshakes. Idempotent.
    ///
    /// # Errors
    /// Transport shutdown errors when the listener owns the endpoint.
    pub async fn close(&mut self) -> Result<()> {
        if !self.stop() {
            return Ok(());
        }
        if self.owns_endpoint {
            self.endpoint.shutdown().await?;
        }
        Ok(())
    }

    fn stop(&mut self) -> bool {
        let Some(task) = self.task.take() else {
            return false;
        };
        task.abort();
        self.endpoint.stop_listening();
        self.accepted.close();
        debug!(local_addr = %self.endpoint.local_addr(), "Listener closed");
        true
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if self.stop() && self.owns_endpoint {
            self.endpoint.close();
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.endpoint.local_addr())
            .field("owns_endpoint", &self.owns_endpoint)
            .field("closed", &self.task.is_none())
            .finish_non_exhaustive()
    }
}

// ============================================
// Accept Loop
// ============================================

async fn accept_loop(
    endpoint: Endpoint,
    options: Arc<ListenerOptions>,
    mut incoming: mpsc::Receiver<Incoming>,
    accepted: mpsc::Sender<SessionConnection>,
) {
    // Aborting this task drops the set, which aborts every handshake in it.
    let mut handshakes = JoinSet::new();

    loop {
        tokio::select! {
            next = incoming.recv() => {
                let Some(next) = next else { break };
                handshakes.spawn(respond(
                    endpoint.clone(),
                    Arc::clone(&options),
                    next,
                    accepted.clone(),
                ));
            }
            Some(_) = handshakes.join_next(), if !handshakes.is_empty() => {}
        }
    }
    debug!("Accept loop stopped");
}

async fn respond(
    endpoint: Endpoint,
    options: Arc<ListenerOptions>,
    incoming: Incoming,
    accepted: mpsc::Sender<SessionConnection>,
) {
    let Incoming {
        peer,
        mut inbox,
        first,
        permit,
    } = incoming;
    let route = RouteGuard::new(&endpoint, peer);

    let session = options.responder(peer, endpoint.local_addr());
    let result = handlers::drive(
        session,
        &endpoint,
        &mut inbox,
        Some(first),
        options.config.timeout(),
    )
    .await;
    drop(permit);

    match result {
        Ok(established) => {
            route.disarm();
            let conn = SessionConnection::new(established, endpoint.clone(), inbox, false);
            if accepted.send(conn).await.is_err() {
                debug!(%peer, "Listener gone, dropping accepted session");
            }
        }
        Err(e) => debug!(%peer, error = %e, "Inbound handshake failed"),
    }
}

/// Unregisters a peer's route unless the handshake hands it on.
struct RouteGuard<'a> {
    endpoint: &'a Endpoint,
    peer: SocketAddr,
    armed: bool,
}

impl<'a> RouteGuard<'a> {
    const fn new(endpoint: &'a Endpoint, peer: SocketAddr) -> Self {
        Self {
            endpoint,
            peer,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RouteGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.endpoint.unregister(&self.peer);
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use ssu_core::crypto::IdentityKeyPair;
    use ssu_transport::MemoryNetwork;

    fn options() -> ListenerOptions {
        ListenerOptions::new(Arc::new(IdentityKeyPair::generate()), IntroKey::generate())
    }

    #[tokio::test]
    async fn test_garbage_source_is_released() {
        let net = MemoryNetwork::new();
        let local: SocketAddr = "10.0.0.1:8887".parse().unwrap();
        let stranger: SocketAddr = "10.0.0.9:4000".parse().unwrap();
        let endpoint = Endpoint::with_transport(net.bind(local).unwrap(), &HandshakeConfig::default()).unwrap();
        let _listener = Listener::over(&endpoint, options()).unwrap();

        assert!(net.inject(stranger, local, &[0u8; 64]));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(endpoint.route_count(), 0);
        assert_eq!(endpoint.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_one_listener_per_endpoint() {
        let net = MemoryNetwork::new();
        let endpoint = Endpoint::with_transport(
            net.bind("10.0.0.1:8887".parse().unwrap()).unwrap(),
            &HandshakeConfig::default(),
        )
        .unwrap();

        let mut first = Listener::over(&endpoint, options()).unwrap();
        assert!(matches!(
            Listener::over(&endpoint, options()),
            Err(NodeError::Unsupported { .. })
        ));

        // Closing frees the slot; the foreign endpoint stays up.
        first.close().await.unwrap();
        first.close().await.unwrap();
        assert!(!endpoint.is_closed());
        assert!(Listener::over(&endpoint, options()).is_ok());
    }

    #[tokio::test]
    async fn test_accept_after_close_reports_closed() {
        let mut listener = Listener::bind("127.0.0.1:0".parse().unwrap(), options())
            .await
            .unwrap();
        assert_ne!(listener.local_addr().port(), 0);

        listener.close().await.unwrap();
        assert!(listener.endpoint().is_closed());
        assert!(matches!(listener.accept().await, Err(NodeError::Closed)));
    }
}
