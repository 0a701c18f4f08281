//! One pairwise handshake, driven stage by stage
//!
//! ```text
//! Initiator                                   Responder
//!     |------------- SYN (send-with-ack) ------------>|  Idle -> SynSent
//!     |                                    recv SYN   |  -> AckObserved
//!     |<------------ public key (hex) ----------------|  -> KeyMaterialSent
//!     |  [DH only: initiator public key -------------->]
//!     |  encapsulate / compute                         |
//!     |------------- ciphertext (KEM, RSA) ----------->|
//!     |                         decapsulate / compute  |  -> SecretDerived
//!     |------------- message|hex(tag) --------------->|  -> Authenticated
//! ```
//!
//! Any error moves the session to `Failed`. Node session keys are written
//! only after a successful authentication.

use crate::auth::{AuthReport, TranscriptAuthenticator};
use crate::config::HandshakeConfig;
use crate::error::{HandshakeError, Result, TransportError};
use crate::latency::{
    LatencyRecorder, COMPUTE_SS_CPU, CT_TRANSMISSION, DECAP_CPU, ENCAP_CPU, HANDSHAKE_TOTAL,
    KEYGEN_CPU, PK_TRANSMISSION,
};
use crate::node::NodeHandle;
use crate::transport::{Endpoint, Message, Network};
use crate::types::{ControlToken, LinkLabel, NodeId, Stage};
use crate::wire::{decode_artifact, encode_artifact};
use crypto::{CryptoError, ExchangeKind, KeyExchangeBackend, SharedSecret};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Whether the transcript check passed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AuthenticationOutcome {
    Success,
    Failure,
}

/// Per-stage artifacts collected during a session
#[derive(Clone, Debug, Default)]
pub struct SessionArtifacts {
    /// Responder's public artifact
    pub public_key: Option<Vec<u8>>,
    /// Initiator's public artifact (Diffie-Hellman only)
    pub initiator_public_key: Option<Vec<u8>>,
    /// KEM or key-transport ciphertext
    pub ciphertext: Option<Vec<u8>>,
    /// Secret derived by the initiator
    pub local_secret: Option<SharedSecret>,
    /// Secret derived by the responder
    pub peer_secret: Option<SharedSecret>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Initiator,
    Responder,
}

impl Side {
    fn peer(self) -> Side {
        match self {
            Side::Initiator => Side::Responder,
            Side::Responder => Side::Initiator,
        }
    }
}

/// Drives one handshake between an initiator and a responder
pub struct HandshakeSession {
    initiator: NodeHandle,
    responder: NodeHandle,
    initiator_endpoint: Endpoint,
    responder_endpoint: Endpoint,
    backend: Arc<dyn KeyExchangeBackend>,
    config: HandshakeConfig,
    authenticator: TranscriptAuthenticator,
    history: Vec<Stage>,
    artifacts: SessionArtifacts,
    outcome: Option<AuthenticationOutcome>,
    auth_report: Option<AuthReport>,
    failure: Option<String>,
    created_at: Instant,
    completed_at: Option<Instant>,
    latency: LatencyRecorder,
}

impl HandshakeSession {
    /// Create a session in `Idle`. Both nodes must be registered on `network`.
    pub fn new(
        network: &Network,
        initiator: NodeHandle,
        responder: NodeHandle,
        backend: Arc<dyn KeyExchangeBackend>,
        config: HandshakeConfig,
    ) -> Result<Self> {
        let endpoint_for = |id: &NodeId| {
            network
                .endpoint(id)
                .map_err(|_| HandshakeError::UnknownNode(id.clone()))
        };
        let initiator_endpoint = endpoint_for(initiator.id())?;
        let responder_endpoint = endpoint_for(responder.id())?;

        Ok(Self {
            initiator,
            responder,
            initiator_endpoint,
            responder_endpoint,
            backend,
            authenticator: TranscriptAuthenticator::new(&config),
            config,
            history: vec![Stage::Idle],
            artifacts: SessionArtifacts::default(),
            outcome: None,
            auth_report: None,
            failure: None,
            created_at: Instant::now(),
            completed_at: None,
            latency: LatencyRecorder::new(),
        })
    }

    pub fn initiator(&self) -> &NodeId {
        self.initiator.id()
    }

    pub fn responder(&self) -> &NodeId {
        self.responder.id()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Current stage
    pub fn stage(&self) -> Stage {
        self.history.last().copied().unwrap_or(Stage::Idle)
    }

    /// Every stage visited, starting with `Idle`
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    pub fn artifacts(&self) -> &SessionArtifacts {
        &self.artifacts
    }

    pub fn outcome(&self) -> Option<AuthenticationOutcome> {
        self.outcome
    }

    pub fn auth_report(&self) -> Option<AuthReport> {
        self.auth_report
    }

    /// Why the session failed, if it did
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn latency(&self) -> &LatencyRecorder {
        &self.latency
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<Instant> {
        self.completed_at
    }

    /// Time from creation to completion
    pub fn elapsed(&self) -> Option<Duration> {
        self.completed_at
            .map(|done| done.saturating_duration_since(self.created_at))
    }

    /// Run the handshake to a terminal stage.
    ///
    /// Returns the authentication report on success. On any failure the
    /// session is left in `Failed` and the cause is returned.
    pub async fn run(&mut self) -> Result<AuthReport> {
        let stage = self.stage();
        if stage.is_terminal() {
            return Err(HandshakeError::AlreadyFinished(stage));
        }
        if stage != Stage::Idle {
            return Err(HandshakeError::InvalidTransition {
                from: stage,
                to: Stage::SynSent,
            });
        }

        let started = Instant::now();
        let result = self.drive().await;
        let total = LinkLabel::new(self.initiator.id(), self.responder.id());
        self.latency.record(HANDSHAKE_TOTAL, total, started.elapsed());
        self.completed_at = Some(Instant::now());

        match result {
            Ok(report) => {
                tracing::info!(
                    initiator = %self.initiator.id(),
                    responder = %self.responder.id(),
                    backend = self.backend.name(),
                    elapsed = ?started.elapsed(),
                    "handshake authenticated"
                );
                Ok(report)
            }
            Err(err) => {
                tracing::warn!(
                    initiator = %self.initiator.id(),
                    responder = %self.responder.id(),
                    backend = self.backend.name(),
                    stage = %self.stage(),
                    error = %err,
                    "handshake failed"
                );
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Drop messages an earlier session on this link left queued
    async fn discard_residue(&self) -> Result<()> {
        let stale_for_initiator = self.initiator_endpoint.drain(self.responder.id()).await?;
        let stale_for_responder = self.responder_endpoint.drain(self.initiator.id()).await?;
        let discarded = stale_for_initiator.len() + stale_for_responder.len();
        if discarded > 0 {
            tracing::warn!(
                initiator = %self.initiator.id(),
                responder = %self.responder.id(),
                discarded,
                "discarding residue from an earlier session"
            );
        }
        Ok(())
    }

    async fn drive(&mut self) -> Result<AuthReport> {
        self.discard_residue().await?;
        self.syn_exchange().await?;
        let (local, peer) = match self.backend.kind() {
            ExchangeKind::Kem | ExchangeKind::KeyTransport => self.encapsulation_exchange().await?,
            ExchangeKind::DiffieHellman => self.diffie_hellman_exchange().await?,
        };
        self.authenticate(local, peer).await
    }

    /// Move one step along the success path
    fn advance(&mut self, to: Stage) -> Result<()> {
        let from = self.stage();
        if from.is_terminal() {
            return Err(HandshakeError::AlreadyFinished(from));
        }
        if from.next() != Some(to) {
            return Err(HandshakeError::InvalidTransition { from, to });
        }
        self.history.push(to);
        if self.config.verbose_logging {
            tracing::debug!(
                initiator = %self.initiator.id(),
                responder = %self.responder.id(),
                %from,
                %to,
                "stage transition"
            );
        }
        Ok(())
    }

    fn fail(&mut self, err: &HandshakeError) {
        if !self.stage().is_terminal() {
            self.history.push(Stage::Failed);
        }
        self.failure = Some(err.to_string());
    }

    fn id(&self, side: Side) -> &NodeId {
        match side {
            Side::Initiator => self.initiator.id(),
            Side::Responder => self.responder.id(),
        }
    }

    fn node(&self, side: Side) -> &NodeHandle {
        match side {
            Side::Initiator => &self.initiator,
            Side::Responder => &self.responder,
        }
    }

    fn endpoint(&self, side: Side) -> &Endpoint {
        match side {
            Side::Initiator => &self.initiator_endpoint,
            Side::Responder => &self.responder_endpoint,
        }
    }

    fn step(&self, side: Side, token: ControlToken) {
        if self.config.verbose_logging {
            tracing::debug!(
                node = %self.id(side),
                peer = %self.id(side.peer()),
                %token,
                backend = self.backend.name(),
                "handshake step"
            );
        }
    }

    /// Run a backend operation on behalf of `side`, recording its duration
    fn timed<T>(
        &mut self,
        stage: &'static str,
        side: Side,
        op: impl FnOnce(&dyn KeyExchangeBackend) -> std::result::Result<T, CryptoError>,
    ) -> Result<T> {
        let backend = self.backend.clone();
        let started = Instant::now();
        let out = op(backend.as_ref())?;
        let link = LinkLabel::new(self.id(side), self.id(side.peer()));
        self.latency.record(stage, link, started.elapsed());
        Ok(out)
    }

    /// Hex-encode and send `bytes` from `side` to its peer with a bounded ack
    async fn transmit(&mut self, stage: &'static str, side: Side, bytes: &[u8], entering: Stage) -> Result<()> {
        let to = self.id(side.peer()).clone();
        let started = Instant::now();
        self.endpoint(side)
            .send_with_ack(&to, encode_artifact(bytes), Some(self.config.ack_timeout))
            .await
            .map_err(timeout_entering(entering))?;
        let link = LinkLabel::new(self.id(side), &to);
        self.latency.record(stage, link, started.elapsed());
        Ok(())
    }

    async fn syn_exchange(&mut self) -> Result<()> {
        let responder = self.responder.id().clone();
        let initiator = self.initiator.id().clone();

        self.step(Side::Initiator, ControlToken::Syn);
        self.initiator_endpoint
            .send_with_ack(&responder, ControlToken::Syn.as_str(), self.config.syn_ack_timeout)
            .await
            .map_err(timeout_entering(Stage::SynSent))?;
        self.advance(Stage::SynSent)?;

        await_syn(&self.responder_endpoint, &initiator, self.config.syn_wait).await?;
        self.step(Side::Responder, ControlToken::Ack);
        self.step(Side::Responder, ControlToken::Ready);
        self.advance(Stage::AckObserved)
    }

    /// KEM and key transport: responder publishes, initiator encapsulates,
    /// responder decapsulates
    async fn encapsulation_exchange(&mut self) -> Result<(SharedSecret, SharedSecret)> {
        let (public, private) = self.timed(KEYGEN_CPU, Side::Responder, |b| b.generate_keypair())?;
        self.node(Side::Responder)
            .lock()
            .await
            .set_private_key(private.clone());

        self.step(Side::Responder, ControlToken::SendPk);
        self.transmit(PK_TRANSMISSION, Side::Responder, &public, Stage::KeyMaterialSent)
            .await?;
        self.artifacts.public_key = Some(public);
        self.advance(Stage::KeyMaterialSent)?;

        let received_pk = receive_artifact(
            &self.initiator_endpoint,
            self.responder.id(),
            "public key",
            self.config.artifact_wait,
        )
        .await?;
        let (ciphertext, local) =
            self.timed(ENCAP_CPU, Side::Initiator, |b| b.encapsulate(&received_pk))?;

        self.step(Side::Initiator, ControlToken::SendCt);
        self.transmit(CT_TRANSMISSION, Side::Initiator, &ciphertext, Stage::SecretDerived)
            .await?;
        self.artifacts.ciphertext = Some(ciphertext);

        let received_ct = receive_artifact(
            &self.responder_endpoint,
            self.initiator.id(),
            "ciphertext",
            self.config.artifact_wait,
        )
        .await?;
        let peer = self.timed(DECAP_CPU, Side::Responder, |b| {
            b.decapsulate(&received_ct, &private)
        })?;
        self.step(Side::Responder, ControlToken::Done);

        self.artifacts.local_secret = Some(local.clone());
        self.artifacts.peer_secret = Some(peer.clone());
        self.advance(Stage::SecretDerived)?;
        Ok((local, peer))
    }

    /// Diffie-Hellman: both sides publish, both compute
    async fn diffie_hellman_exchange(&mut self) -> Result<(SharedSecret, SharedSecret)> {
        let (responder_public, responder_private) =
            self.timed(KEYGEN_CPU, Side::Responder, |b| b.generate_keypair())?;
        self.node(Side::Responder)
            .lock()
            .await
            .set_private_key(responder_private.clone());
        self.step(Side::Responder, ControlToken::SendPk);
        self.transmit(PK_TRANSMISSION, Side::Responder, &responder_public, Stage::KeyMaterialSent)
            .await?;

        let (initiator_public, initiator_private) =
            self.timed(KEYGEN_CPU, Side::Initiator, |b| b.generate_keypair())?;
        self.node(Side::Initiator)
            .lock()
            .await
            .set_private_key(initiator_private.clone());
        self.step(Side::Initiator, ControlToken::SendPk);
        self.transmit(PK_TRANSMISSION, Side::Initiator, &initiator_public, Stage::KeyMaterialSent)
            .await?;

        self.artifacts.public_key = Some(responder_public);
        self.artifacts.initiator_public_key = Some(initiator_public);
        self.advance(Stage::KeyMaterialSent)?;

        let from_responder = receive_artifact(
            &self.initiator_endpoint,
            self.responder.id(),
            "public key",
            self.config.artifact_wait,
        )
        .await?;
        let local = self.timed(COMPUTE_SS_CPU, Side::Initiator, |b| {
            b.compute_shared(&initiator_private, &from_responder)
        })?;

        let from_initiator = receive_artifact(
            &self.responder_endpoint,
            self.initiator.id(),
            "public key",
            self.config.artifact_wait,
        )
        .await?;
        let peer = self.timed(COMPUTE_SS_CPU, Side::Responder, |b| {
            b.compute_shared(&responder_private, &from_initiator)
        })?;
        self.step(Side::Responder, ControlToken::Done);

        self.artifacts.local_secret = Some(local.clone());
        self.artifacts.peer_secret = Some(peer.clone());
        self.advance(Stage::SecretDerived)?;
        Ok((local, peer))
    }

    async fn authenticate(&mut self, local: SharedSecret, peer: SharedSecret) -> Result<AuthReport> {
        let report = self
            .authenticator
            .authenticate(&self.initiator_endpoint, &self.responder_endpoint, &local, &peer)
            .await
            .map_err(|err| match err {
                HandshakeError::Transport(TransportError::AckTimeout { .. }) => {
                    HandshakeError::Timeout(Stage::Authenticated)
                }
                other => other,
            })?;
        self.auth_report = Some(report);

        if !report.success {
            self.outcome = Some(AuthenticationOutcome::Failure);
            return Err(HandshakeError::AuthenticationMismatch {
                malformed_skipped: report.malformed_skipped,
            });
        }

        self.outcome = Some(AuthenticationOutcome::Success);
        self.advance(Stage::Authenticated)?;

        let (initiator, responder) = (self.initiator.id().clone(), self.responder.id().clone());
        self.initiator
            .lock()
            .await
            .install_session_key(&responder, local);
        self.responder
            .lock()
            .await
            .install_session_key(&initiator, peer);
        Ok(report)
    }
}

/// Map elapsed transport deadlines to a stage timeout
fn timeout_entering(stage: Stage) -> impl FnOnce(TransportError) -> HandshakeError {
    move |err| match err {
        TransportError::AckTimeout { .. } | TransportError::RecvTimeout { .. } => {
            HandshakeError::Timeout(stage)
        }
        other => other.into(),
    }
}

/// Most recent message queued from `from`, earlier ones discarded.
///
/// Every send in a session is acknowledged before the matching receive, so
/// anything queued ahead of the last message was parked by an earlier
/// session and flushed on reconnect.
async fn receive_latest(
    endpoint: &Endpoint,
    from: &NodeId,
    wait: Duration,
) -> std::result::Result<Option<Message>, TransportError> {
    let mut batch = endpoint.recv_batch(from, wait).await?;
    let latest = batch.pop();
    if !batch.is_empty() {
        tracing::warn!(
            node = %endpoint.id(),
            from = %from,
            discarded = batch.len(),
            "discarding stale messages"
        );
    }
    Ok(latest)
}

/// Responder side of the opening: the latest message from the initiator
/// must be SYN
async fn await_syn(endpoint: &Endpoint, from: &NodeId, wait: Duration) -> Result<()> {
    let syn = receive_latest(endpoint, from, wait)
        .await
        .map_err(timeout_entering(Stage::AckObserved))?
        .ok_or(HandshakeError::Timeout(Stage::AckObserved))?;
    if syn.content.parse::<ControlToken>() != Ok(ControlToken::Syn) {
        return Err(HandshakeError::UnexpectedMessage {
            expected: ControlToken::Syn.as_str(),
            got: syn.content,
        });
    }
    Ok(())
}

async fn receive_artifact(
    endpoint: &Endpoint,
    from: &NodeId,
    artifact: &'static str,
    wait: Duration,
) -> Result<Vec<u8>> {
    let missing = || HandshakeError::MissingArtifact {
        artifact,
        from: from.clone(),
    };
    let message = receive_latest(endpoint, from, wait)
        .await
        .map_err(|err| match err {
            TransportError::RecvTimeout { .. } => missing(),
            other => other.into(),
        })?
        .ok_or_else(missing)?;
    decode_artifact(&message.content).map_err(|_| HandshakeError::MalformedArtifact {
        artifact,
        from: from.clone(),
    })
}
