// ============================================
// File: crates/ssu-node/src/dialer.rs
// ============================================
//! # Dialer
//!
//! ## Creation Reason
//! Initiator entry point: runs the handshake against a remote peer and
//! returns an established [`SessionConnection`].
//!
//! ## Main Functionality
//! - `dial`: binds a fresh UDP endpoint owned by the connection
//! - `dial_over`: reuses a caller-supplied endpoint, never shutting it down
//! - `dial_indirect`: introducer-assisted dialing, reported as unsupported
//!
//! ## ⚠️ Important Note for Next Developer
//! - One handshake per peer per endpoint; a second concurrent dial to the
//!   same address over one endpoint fails with `PeerBusy`
//! - Without a real confirmation codec every dial ends in a clean
//!   `Handshake` failure at `CreatedReceived`
//!
//! ## Last Modified
//! v0.1.0 - Initial dialer

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tracing::{debug, warn};

use ssu_core::crypto::{Ed25519Verifier, HandshakeVerifier, IdentityPublicKey, IntroKey};
use ssu_core::protocol::{ConfirmationCodec, UnimplementedConfirmation};

use crate::config::HandshakeConfig;
use crate::endpoint::Endpoint;
use crate::error::{NodeError, Result};
use crate::handlers;
use crate::services::{HandshakeSession, SessionConnection};

// ============================================
// RemotePeer
// ============================================

/// Everything needed to reach one responder directly.
#[derive(Clone)]
pub struct RemotePeer {
    /// Responder transport address.
    pub addr: SocketAddr,
    /// Responder's published introduction key.
    pub intro_key: IntroKey,
    verifier: Arc<dyn HandshakeVerifier>,
}

impl RemotePeer {
    /// Peer authenticated by its Ed25519 identity.
    #[must_use]
    pub fn new(addr: SocketAddr, intro_key: IntroKey, identity: IdentityPublicKey) -> Self {
        Self::with_verifier(addr, intro_key, Arc::new(Ed25519Verifier::new(identity)))
    }

    /// Peer authenticated by a custom verifier.
    #[must_use]
    pub fn with_verifier(
        addr: SocketAddr,
        intro_key: IntroKey,
        verifier: Arc<dyn HandshakeVerifier>,
    ) -> Self {
        Self {
            addr,
            intro_key,
            verifier,
        }
    }
}

impl std::fmt::Debug for RemotePeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemotePeer")
            .field("addr", &self.addr)
            .field("intro_key", &self.intro_key)
            .finish_non_exhaustive()
    }
}

// ============================================
// Dialer
// ============================================

/// Initiates SSU sessions.
#[derive(Clone)]
pub struct Dialer {
    config: HandshakeConfig,
    confirmation: Arc<dyn ConfirmationCodec>,
    bind_addr: Option<SocketAddr>,
}

impl Dialer {
    /// Dialer with the given handshake settings and no confirmation codec.
    #[must_use]
    pub fn new(config: HandshakeConfig) -> Self {
        Self {
            config,
            confirmation: Arc::new(UnimplementedConfirmation),
            bind_addr: None,
        }
    }

    /// Installs the SessionConfirmed codec.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: Arc<dyn ConfirmationCodec>) -> Self {
        self.confirmation = confirmation;
        self
    }

    /// Local address for endpoints bound by [`Dialer::dial`].
    ///
    /// Defaults to an ephemeral port on the unspecified address of the
    /// peer's family.
    #[must_use]
    pub const fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = Some(addr);
        self
    }

    /// Handshake settings in use.
    #[must_use]
    pub const fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// Dials `peer` over a freshly bound UDP endpoint.
    ///
    /// The returned connection owns the endpoint and shuts it down on close.
    ///
    /// # Errors
    /// Bind failures, or any handshake error from [`Dialer::dial_over`].
    pub async fn dial(&self, peer: &RemotePeer) -> Result<SessionConnection> {
        let bind_addr = self.bind_addr.unwrap_or_else(|| unspecified_for(&peer.addr));
        let endpoint = Endpoint::bind(bind_addr, &self.config).await?;

        match self.handshake(&endpoint, peer, true).await {
            Ok(conn) => Ok(conn),
            Err(e) => {
                if let Err(shutdown) = endpoint.shutdown().await {
                    warn!(peer = %peer.addr, error = %shutdown, "Endpoint shutdown after failed dial");
                }
                Err(e)
            }
        }
    }

    /// Dials `peer` over an existing endpoint.
    ///
    /// Closing the returned connection leaves the endpoint running.
    ///
    /// # Errors
    /// - `PeerBusy` if `peer` already has a route on `endpoint`
    /// - `Handshake` / `HandshakeTimeout` if the handshake fails
    pub async fn dial_over(&self, endpoint: &Endpoint, peer: &RemotePeer) -> Result<SessionConnection> {
        self.handshake(endpoint, peer, false).await
    }

    /// Dials through an introducer.
    ///
    /// # Errors
    /// Always `Unsupported`; the relay protocol is not implemented.
    pub async fn dial_indirect(&self, _peer: &RemotePeer) -> Result<SessionConnection> {
        Err(NodeError::unsupported("indirect dialing via introducers"))
    }

    async fn handshake(
        &self,
        endpoint: &Endpoint,
        peer: &RemotePeer,
        owns_endpoint: bool,
    ) -> Result<SessionConnection> {
        let mut inbox = endpoint.register(peer.addr)?;
        debug!(peer = %peer.addr, local = %endpoint.local_addr(), "Dialing");

        let session = HandshakeSession::initiator(
            peer.addr,
            endpoint.local_addr(),
            peer.intro_key.clone(),
            Arc::clone(&peer.verifier),
            Arc::clone(&self.confirmation),
            &self.config,
        );

        match handlers::drive(session, endpoint, &mut inbox, None, self.config.timeout()).await {
            Ok(established) => Ok(SessionConnection::new(
                established,
                endpoint.clone(),
                inbox,
                owns_endpoint,
            )),
            Err(e) => {
                endpoint.unregister(&peer.addr);
                Err(e)
            }
        }
    }
}

impl Default for Dialer {
    fn default() -> Self {
        Self::new(HandshakeConfig::default())
    }
}

impl std::fmt::Debug for Dialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialer")
            .field("config", &self.config)
            .field("bind_addr", &self.bind_addr)
            .finish_non_exhaustive()
    }
}

fn unspecified_for(peer: &SocketAddr) -> SocketAddr {
    match peer {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    }
}

// ============================================
// Tests
// ============================================
