// ============================================
// File: crates/ssu-node/src/services/handshake.rs
// ============================================
//! # Handshake State Machine
//!
//! ## Creation Reason
//! Sequences the three SSU handshake messages for either role without
//! touching a socket. The async driver in `handlers::handshake` feeds it
//! datagrams and timer expiries and sends whatever it returns.
//!
//! ## Main Functionality
//! - `HandshakeSession`: one attempt, initiator or responder
//! - `HandshakeState`: where the attempt currently is
//! - `Step`: what the caller should do with an inbound datagram
//! - `Established`: the key material that survives a finished handshake
//! - `PendingConfirmation`: what an initiator resends if SessionConfirmed
//!   is lost
//!
//! ## Handshake Flow
//! ```text
//!   Initiator                                   Responder
//!   Idle                                        Idle
//!     │ start()                                   │
//!     ├── SessionRequest (intro key) ───────────► │ RequestReceived
//!   RequestSent                                   │ derive keys, sign
//!     │ ◄───────────── SessionCreated (intro key) ┤ CreatedSent
//!   CreatedReceived                               │
//!     │ verify, derive keys                       │
//!     ├── SessionConfirmed (session keys) ──────► │ ConfirmedReceived
//!   ConfirmedSent                                 │ verify
//!   Established                                 Established
//! ```
//!
//! ## Discard Rules
//! A datagram that fails the MAC, fails to parse, has the wrong payload
//! type or a timestamp outside the clock-skew window leaves the machine
//! untouched (`Step::Discarded`).
//!
//! ## ⚠️ Important Note for Next Developer
//! - `Failed` and `TimedOut` are absorbing; every call after them errors
//! - An established initiator answers a byte-identical SessionCreated
//!   retransmit with its SessionConfirmed again; anything else errors
//! - Handshake datagrams in BOTH directions use the responder's intro key
//! - Private DH material is consumed by the exchange; `cancel()` and the
//!   terminal states drop everything else
//!
//! ## Last Modified
//! v0.1.0 - Initial handshake state machine

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use ssu_common::Timestamp;
use ssu_core::crypto::handshake::session_created_hash;
use ssu_core::crypto::kdf::derive_session_keys;
use ssu_core::crypto::transport::Datagram;
use ssu_core::crypto::{
    DatagramCodec, DhKeyPair, FramingKeys, HandshakeSigner, HandshakeVerifier, IntroKey,
    SessionKeys, DH_PUBLIC_SIZE,
};
use ssu_core::error::CoreError;
use ssu_core::protocol::{
    ConfirmationCodec, ConfirmationContext, HandshakeCodec, HandshakeMessage, PayloadType,
    SessionCreated, SessionRequest,
};

use crate::config::HandshakeConfig;
use crate::error::{NodeError, Result};

// ============================================
// HandshakeState
// ============================================

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    /// Nothing sent or received yet.
    Idle,
    /// Initiator sent SessionRequest.
    RequestSent,
    /// Responder accepted a SessionRequest.
    RequestReceived,
    /// Initiator accepted a SessionCreated.
    CreatedReceived,
    /// Responder sent SessionCreated.
    CreatedSent,
    /// Initiator sent SessionConfirmed.
    ConfirmedSent,
    /// Responder accepted a SessionConfirmed.
    ConfirmedReceived,
    /// Session keys are ready.
    Established,
    /// Aborted by a verification or confirmation failure.
    Failed,
    /// Retries exhausted or cancelled.
    TimedOut,
}

impl HandshakeState {
    /// Returns `true` for `Established`, `Failed` and `TimedOut`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Established | Self::Failed | Self::TimedOut)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which side of the handshake this session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sends SessionRequest.
    Initiator,
    /// Answers with SessionCreated.
    Responder,
}

/// Outcome of feeding one datagram to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Datagram dropped; nothing changed.
    Discarded,
    /// Send this datagram to the peer and keep waiting.
    Reply(Bytes),
    /// Handshake established. Send the datagram, if any, first.
    Complete(Option<Bytes>),
}

/// Key material and addressing kept after `Established`.
#[derive(Debug)]
pub struct Established {
    /// Role this side played.
    pub role: Role,
    /// Derived session keys.
    pub keys: SessionKeys,
    /// Remote transport address.
    pub peer: SocketAddr,
    /// Relay tag from SessionCreated (0 for none).
    pub relay_tag: u32,
    /// Initiator only: the SessionConfirmed to resend on a SessionCreated
    /// retransmit.
    pub pending_confirmation: Option<PendingConfirmation>,
}

/// An initiator's SessionConfirmed and the SessionCreated it answered.
///
/// The responder retransmits its last SessionCreated verbatim until a
/// SessionConfirmed arrives, so seeing `created` again means `confirmed`
/// was lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConfirmation {
    /// The SessionCreated datagram as received.
    pub created: Bytes,
    /// The SessionConfirmed datagram as sent.
    pub confirmed: Bytes,
    /// How many more times `confirmed` may be resent.
    pub resends: u32,
}

impl PendingConfirmation {
    /// Returns the datagram to resend if `datagram` is the recorded
    /// SessionCreated and resends remain.
    pub fn answer(&mut self, datagram: &[u8]) -> Option<Bytes> {
        if self.resends == 0 || self.created[..] != *datagram {
            return None;
        }
        self.resends -= 1;
        Some(self.confirmed.clone())
    }
}

enum Authenticator {
    Verify(Arc<dyn HandshakeVerifier>),
    Sign(Arc<dyn HandshakeSigner>),
}

// ============================================
// HandshakeSession
// ============================================

/// One handshake attempt.
///
/// # Example
/// ```ignore
/// let mut alice = HandshakeSession::initiator(bob_addr, alice_addr, bob_intro, verifier, confirm, &config);
/// let mut bob = HandshakeSession::responder(alice_addr, bob_addr, bob_intro, signer, confirm, &config);
///
/// let request = alice.start()?;
/// let Step::Reply(created) = bob.handle_datagram(&request)? else { unreachable!() };
/// let Step::Complete(Some(confirmed)) = alice.handle_datagram(&created)? else { unreachable!() };
/// bob.handle_datagram(&confirmed)?;
/// ```
pub struct HandshakeSession {
    role: Role,
    state: HandshakeState,
    peer: SocketAddr,
    local: SocketAddr,
    intro_key: IntroKey,
    auth: Authenticator,
    confirmation: Arc<dyn ConfirmationCodec>,
    codec: HandshakeCodec,
    datagrams: DatagramCodec,
    config: HandshakeConfig,

    dh: Option<DhKeyPair>,
    x: Option<[u8; DH_PUBLIC_SIZE]>,
    y: Option<[u8; DH_PUBLIC_SIZE]>,
    keys: Option<SessionKeys>,
    initiator_addr: Option<SocketAddr>,
    responder_addr: Option<SocketAddr>,
    relay_tag: u32,
    signed_on: Timestamp,

    last_sent: Option<Bytes>,
    attempts: u32,
    last_send_at: Option<Instant>,
    pending_confirmation: Option<PendingConfirmation>,
}

impl HandshakeSession {
    /// Creates the initiator side of a handshake with `peer`.
    ///
    /// `intro_key` is the responder's published intro key and `verifier`
    /// checks the responder's SessionCreated signature.
    #[must_use]
    pub fn initiator(
        peer: SocketAddr,
        local: SocketAddr,
        intro_key: IntroKey,
        verifier: Arc<dyn HandshakeVerifier>,
        confirmation: Arc<dyn ConfirmationCodec>,
        config: &HandshakeConfig,
    ) -> Self {
        let codec = HandshakeCodec::new(verifier.signature_len());
        Self::new(
            Role::Initiator,
            peer,
            local,
            intro_key,
            Authenticator::Verify(verifier),
            codec,
            confirmation,
            config,
        )
    }

    /// Creates the responder side for a request arriving from `peer`.
    ///
    /// `intro_key` is this node's own intro key.
    #[must_use]
    pub fn responder(
        peer: SocketAddr,
        local: SocketAddr,
        intro_key: IntroKey,
        signer: Arc<dyn HandshakeSigner>,
        confirmation: Arc<dyn ConfirmationCodec>,
        config: &HandshakeConfig,
    ) -> Self {
        let codec = HandshakeCodec::new(signer.signature_len());
        Self::new(
            Role::Responder,
            peer,
            local,
            intro_key,
            Authenticator::Sign(signer),
            codec,
            confirmation,
            config,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        role: Role,
        peer: SocketAddr,
        local: SocketAddr,
        intro_key: IntroKey,
        auth: Authenticator,
        codec: HandshakeCodec,
        confirmation: Arc<dyn ConfirmationCodec>,
        config: &HandshakeConfig,
    ) -> Self {
        Self {
            role,
            state: HandshakeState::Idle,
            peer,
            local,
            intro_key,
            auth,
            confirmation,
            codec,
            datagrams: DatagramCodec::new(),
            config: config.clone(),
            dh: None,
            x: None,
            y: None,
            keys: None,
            initiator_addr: None,
            responder_addr: None,
            relay_tag: 0,
            signed_on: Timestamp::from_secs(0),
            last_sent: None,
            attempts: 0,
            last_send_at: None,
            pending_confirmation: None,
        }
    }

    // ========================================
    // Accessors
    // ========================================

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> HandshakeState {
        self.state
    }

    /// Role of this side.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Remote transport address.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Number of times the current message has been sent.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// When the pending message should be resent, if one is pending.
    #[must_use]
    pub fn retransmit_at(&self) -> Option<Instant> {
        match self.state {
            HandshakeState::RequestSent | HandshakeState::CreatedSent => self
                .last_send_at
                .map(|at| at + self.config.retransmit_interval()),
            _ => None,
        }
    }

    // ========================================
    // Inputs
    // ========================================

    /// Starts an initiator handshake and returns the SessionRequest datagram.
    ///
    /// # Errors
    /// `Handshake` if this is not an idle initiator or framing fails.
    pub fn start(&mut self) -> Result<Bytes> {
        if self.role != Role::Initiator || self.state != HandshakeState::Idle {
            return Err(self.error("start() requires an idle initiator"));
        }

        let dh = DhKeyPair::generate();
        let x = dh.public_bytes();
        let request = SessionRequest::new(x, self.peer.ip());
        let payload = self
            .codec
            .encode_message(&HandshakeMessage::SessionRequest(request))
            .map_err(|e| self.fail(&e))?;
        let wire = self
            .seal(&self.intro_key, PayloadType::SessionRequest, payload.freeze())
            .map_err(|e| self.fail(&e))?;

        self.dh = Some(dh);
        self.x = Some(x);
        self.state = HandshakeState::RequestSent;
        self.record_send(&wire);
        debug!(peer = %self.peer, "SessionRequest sent");
        Ok(wire)
    }

    /// Feeds one inbound datagram from the peer.
    ///
    /// # Errors
    /// `Handshake` when the datagram aborts the handshake (bad signature,
    /// rejected confirmation) or the machine is already terminal.
    pub fn handle_datagram(&mut self, buf: &[u8]) -> Result<Step> {
        match (self.role, self.state) {
            (Role::Initiator, HandshakeState::RequestSent) => self.on_session_created(buf),
            (Role::Responder, HandshakeState::Idle) => self.on_session_request(buf),
            (Role::Responder, HandshakeState::CreatedSent) => self.on_created_sent(buf),
            (Role::Initiator, HandshakeState::Established) => {
                match self.pending_confirmation.as_mut().and_then(|p| p.answer(buf)) {
                    Some(wire) => {
                        debug!(peer = %self.peer, "Duplicate SessionCreated, resending SessionConfirmed");
                        Ok(Step::Reply(wire))
                    }
                    None => Err(self.error("datagram after the handshake finished")),
                }
            }
            (_, state) if state.is_terminal() => {
                Err(self.error("datagram after the handshake finished"))
            }
            _ => {
                trace!(peer = %self.peer, state = %self.state, "Datagram ignored in this state");
                Ok(Step::Discarded)
            }
        }
    }

    /// Handles a retransmission timer expiry.
    ///
    /// Returns the datagram to resend, or `None` once the retry limit is
    /// spent (the machine is then `TimedOut`) or nothing is pending.
    pub fn on_timeout(&mut self) -> Option<Bytes> {
        if !matches!(
            self.state,
            HandshakeState::RequestSent | HandshakeState::CreatedSent
        ) {
            return None;
        }

        if self.attempts >= self.config.max_attempts {
            debug!(
                peer = %self.peer,
                state = %self.state,
                attempts = self.attempts,
                "Handshake retries exhausted"
            );
            self.cancel();
            return None;
        }

        let wire = self.last_sent.clone()?;
        self.record_send(&wire);
        debug!(peer = %self.peer, state = %self.state, attempt = self.attempts, "Retransmitting");
        Some(wire)
    }

    /// Abandons the handshake, dropping all key material.
    pub fn cancel(&mut self) {
        if self.state != HandshakeState::Established {
            self.state = HandshakeState::TimedOut;
        }
        self.wipe();
    }

    /// Consumes an established session, keeping only what a connection needs.
    #[must_use]
    pub fn into_established(mut self) -> Option<Established> {
        if self.state != HandshakeState::Established {
            return None;
        }
        let keys = self.keys.take()?;
        Some(Established {
            role: self.role,
            keys,
            peer: self.peer,
            relay_tag: self.relay_tag,
            pending_confirmation: self.pending_confirmation.take(),
        })
    }

    // ========================================
    // Initiator
    // ========================================

    fn on_session_created(&mut self, buf: &[u8]) -> Result<Step> {
        let Some(payload) = self.open_expected(&self.intro_key, buf, PayloadType::SessionCreated)
        else {
            return Ok(Step::Discarded);
        };
        let created = match self.codec.decode_message(PayloadType::SessionCreated, payload) {
            Ok(HandshakeMessage::SessionCreated(created)) => created,
            Ok(_) => return Ok(Step::Discarded),
            Err(e) => {
                trace!(peer = %self.peer, error = %e, "Unparsable SessionCreated dropped");
                return Ok(Step::Discarded);
            }
        };
        let Ok(initiator_addr) = created.address.to_socket_addr() else {
            trace!(peer = %self.peer, "SessionCreated with unusable address dropped");
            return Ok(Step::Discarded);
        };
        let Some(x) = self.x else {
            return Err(self.error("SessionCreated before SessionRequest"));
        };

        self.state = HandshakeState::CreatedReceived;

        let hash = session_created_hash(
            &x,
            &created.y,
            &initiator_addr,
            &self.peer,
            created.relay_tag,
            created.signed_on,
        );
        if let Authenticator::Verify(verifier) = &self.auth {
            if let Err(e) = verifier.verify(&hash, &created.signature) {
                warn!(peer = %self.peer, "SessionCreated signature rejected");
                return Err(self.fail(&e));
            }
        }

        let keys = self.exchange(&created.y)?;
        self.y = Some(created.y);
        self.initiator_addr = Some(initiator_addr);
        self.responder_addr = Some(self.peer);
        self.relay_tag = created.relay_tag;
        self.signed_on = created.signed_on;

        let confirmed = {
            let ctx = ConfirmationContext {
                x: &x,
                y: &created.y,
                initiator: initiator_addr,
                responder: self.peer,
                relay_tag: created.relay_tag,
                signed_on: created.signed_on,
                keys: &keys,
            };
            self.confirmation.encode(&ctx)
        };
        let confirmed = confirmed.map_err(|e| self.fail(&e))?;
        let wire = self
            .seal(&keys, PayloadType::SessionConfirmed, confirmed)
            .map_err(|e| self.fail(&e))?;

        self.keys = Some(keys);
        self.state = HandshakeState::ConfirmedSent;
        self.pending_confirmation = Some(PendingConfirmation {
            created: Bytes::copy_from_slice(buf),
            confirmed: wire.clone(),
            resends: self.config.max_attempts,
        });
        self.establish();
        Ok(Step::Complete(Some(wire)))
    }

    // ========================================
    // Responder
    // ========================================

    fn on_session_request(&mut self, buf: &[u8]) -> Result<Step> {
        let Some(request) = self.parse_request(buf) else {
            return Ok(Step::Discarded);
        };
        let Ok(responder_ip) = request.ip_addr() else {
            return Ok(Step::Discarded);
        };

        self.state = HandshakeState::RequestReceived;
        debug!(peer = %self.peer, "SessionRequest accepted");

        let dh = DhKeyPair::generate();
        let y = dh.public_bytes();
        self.dh = Some(dh);
        let keys = self.exchange(&request.x)?;

        let responder_addr = SocketAddr::new(responder_ip, self.local.port());
        let relay_tag = if self.config.offer_relay_tag {
            rand::thread_rng().gen_range(1..=u32::MAX)
        } else {
            0
        };
        let signed_on = Timestamp::now();

        let hash = session_created_hash(
            &request.x,
            &y,
            &self.peer,
            &responder_addr,
            relay_tag,
            signed_on,
        );
        let signature = match &self.auth {
            Authenticator::Sign(signer) => signer.sign(&hash),
            Authenticator::Verify(_) => Err(CoreError::protocol("responder without a signer")),
        };
        let signature = signature.map_err(|e| self.fail(&e))?;

        let created = SessionCreated {
            y,
            address: self.peer.into(),
            relay_tag,
            signed_on,
            signature,
        };
        let payload = self
            .codec
            .encode_message(&HandshakeMessage::SessionCreated(created))
            .map_err(|e| self.fail(&e))?;
        let wire = self
            .seal(&self.intro_key, PayloadType::SessionCreated, payload.freeze())
            .map_err(|e| self.fail(&e))?;

        self.x = Some(request.x);
        self.y = Some(y);
        self.keys = Some(keys);
        self.initiator_addr = Some(self.peer);
        self.responder_addr = Some(responder_addr);
        self.relay_tag = relay_tag;
        self.signed_on = signed_on;
        self.state = HandshakeState::CreatedSent;
        self.record_send(&wire);
        debug!(peer = %self.peer, relay_tag, "SessionCreated sent");
        Ok(Step::Reply(wire))
    }

    fn on_created_sent(&mut self, buf: &[u8]) -> Result<Step> {
        if let Some(keys) = &self.keys {
            if let Ok(datagram) = self.datagrams.open(keys, buf) {
                return self.on_session_confirmed(datagram);
            }
        }

        // Not under the session keys: maybe a retransmitted request.
        let Some(request) = self.parse_request(buf) else {
            return Ok(Step::Discarded);
        };
        if Some(request.x) != self.x {
            trace!(peer = %self.peer, "SessionRequest with a different X dropped");
            return Ok(Step::Discarded);
        }
        match self.last_sent.clone() {
            Some(wire) => {
                debug!(peer = %self.peer, "Duplicate SessionRequest, resending SessionCreated");
                Ok(Step::Reply(wire))
            }
            None => Ok(Step::Discarded),
        }
    }

    fn on_session_confirmed(&mut self, datagram: Datagram) -> Result<Step> {
        if datagram.flag.payload_type != PayloadType::SessionConfirmed
            || !self.is_fresh(datagram.timestamp)
        {
            return Ok(Step::Discarded);
        }
        let (Some(x), Some(y), Some(keys), Some(initiator), Some(responder)) = (
            self.x.as_ref(),
            self.y.as_ref(),
            self.keys.as_ref(),
            self.initiator_addr,
            self.responder_addr,
        ) else {
            return Err(self.error("SessionConfirmed without negotiated state"));
        };

        let ctx = ConfirmationContext {
            x,
            y,
            initiator,
            responder,
            relay_tag: self.relay_tag,
            signed_on: self.signed_on,
            keys,
        };
        match self.confirmation.verify(&ctx, &datagram.payload) {
            Ok(()) => {
                self.state = HandshakeState::ConfirmedReceived;
                self.establish();
                Ok(Step::Complete(None))
            }
            Err(CoreError::MalformedMessage { reason }) => {
                trace!(peer = %self.peer, %reason, "Malformed SessionConfirmed dropped");
                Ok(Step::Discarded)
            }
            Err(e) => Err(self.fail(&e)),
        }
    }

    // ========================================
    // Helpers
    // ========================================

    fn parse_request(&self, buf: &[u8]) -> Option<SessionRequest> {
        let payload = self.open_expected(&self.intro_key, buf, PayloadType::SessionRequest)?;
        match self.codec.decode_message(PayloadType::SessionRequest, payload) {
            Ok(HandshakeMessage::SessionRequest(request)) => Some(request),
            Ok(_) => None,
            Err(e) => {
                trace!(peer = %self.peer, error = %e, "Unparsable SessionRequest dropped");
                None
            }
        }
    }

    /// Opens `buf` and returns its payload if it has the expected type and
    /// a fresh timestamp.
    fn open_expected<K: FramingKeys + ?Sized>(
        &self,
        keys: &K,
        buf: &[u8],
        expected: PayloadType,
    ) -> Option<Bytes> {
        let datagram = match self.datagrams.open(keys, buf) {
            Ok(datagram) => datagram,
            Err(e) => {
                trace!(peer = %self.peer, error = %e, "Handshake datagram dropped");
                return None;
            }
        };
        if datagram.flag.payload_type != expected {
            trace!(
                peer = %self.peer,
                expected = %expected,
                got = %datagram.flag.payload_type,
                "Unexpected payload type dropped"
            );
            return None;
        }
        if !self.is_fresh(datagram.timestamp) {
            return None;
        }
        Some(datagram.payload)
    }

    fn is_fresh(&self, timestamp: Timestamp) -> bool {
        let fresh = timestamp.is_recent(self.config.max_clock_skew_secs);
        if !fresh {
            debug!(
                peer = %self.peer,
                offset = timestamp.offset_from_now(),
                "Datagram outside clock skew window dropped"
            );
        }
        fresh
    }

    fn seal<K: FramingKeys + ?Sized>(
        &self,
        keys: &K,
        payload_type: PayloadType,
        payload: Bytes,
    ) -> std::result::Result<Bytes, CoreError> {
        self.datagrams.seal(keys, &Datagram::new(payload_type, payload))
    }

    fn exchange(&mut self, peer_public: &[u8; DH_PUBLIC_SIZE]) -> Result<SessionKeys> {
        let Some(dh) = self.dh.take() else {
            return Err(self.error("no local DH key pair"));
        };
        let keys = dh
            .exchange(peer_public)
            .and_then(|secret| derive_session_keys(secret.as_bytes()));
        keys.map_err(|e| self.fail(&e))
    }

    fn record_send(&mut self, wire: &Bytes) {
        if self.last_sent.as_ref() != Some(wire) {
            self.attempts = 0;
            self.last_sent = Some(wire.clone());
        }
        self.attempts += 1;
        self.last_send_at = Some(Instant::now());
    }

    fn establish(&mut self) {
        self.state = HandshakeState::Established;
        self.dh = None;
        self.last_sent = None;
        self.last_send_at = None;
        debug!(peer = %self.peer, role = ?self.role, "Handshake established");
    }

    /// Moves to `Failed`, returning the error to surface.
    fn fail(&mut self, cause: &CoreError) -> NodeError {
        let err = NodeError::handshake(self.peer, self.state, cause.to_string());
        self.state = HandshakeState::Failed;
        self.wipe();
        err
    }

    fn error(&self, reason: &str) -> NodeError {
        NodeError::handshake(self.peer, self.state, reason)
    }

    fn wipe(&mut self) {
        self.dh = None;
        self.keys = None;
        self.x = None;
        self.y = None;
        self.last_sent = None;
        self.last_send_at = None;
        self.pending_confirmation = None;
    }
}

impl fmt::Debug for HandshakeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeSession")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("peer", &self.peer)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

// ============================================
// Tests
// ============================================
