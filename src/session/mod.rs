//! Gateway session lifecycle.
//!
//! A [`GatewaySession`] owns one TCP connection to the gateway and walks
//! the negotiation/authentication state machine over signaling frames:
//!
//! ```text
//!  Idle ─ connect() ─> Connecting ──> AwaitingTypeAck ──> AwaitingNegotiationAck
//!                                                             │
//!                       ┌── SHA challenge ──┬── bare nonce ───┤ ACK = open gateway
//!                       v                   v                 v
//!              AwaitingShaChallenge   AwaitingNonce      Authenticated
//!                       │                   │                 ^
//!                       v                   └─────────────────┤
//!              AwaitingServerProof ───────────────────────────┘
//! ```
//!
//! `Failed(reason)` is reachable from every state with exactly one
//! [`SessionFailure`] per failed attempt; `Closed` is the terminal state
//! of a graceful shutdown. A session is never reused across reconnects -
//! each retry builds a fresh one.
//!
//! Transient transport faults are absorbed here: connection refusals are
//! retried on a bounded backoff schedule ([`RetryPolicy`]), connection
//! resets on a persistent session pause 60 s and retry without bound.

mod retry;

pub use retry::{RetryPolicy, RESET_PAUSE};

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, error, warn};

use crate::auth::{self, HashMethod};
use crate::error::{OwnError, Result, SessionFailure};
use crate::frame::{self, classify, Frame, SignalingMessage};
use crate::gateway::Gateway;

/// Deadline on the gateway's reply to the authentication proof.
pub const AUTH_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// What a session is for; selects the wire session type and the retry
/// policy applied while connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Continuous inbound event stream (`*99*1##`).
    Event,
    /// Request/response command channel (`*99*0##`).
    Command,
    /// One-shot connectivity test; command channel with a bounded retry
    /// budget and structured (never panicking) outcomes.
    Test,
}

impl SessionKind {
    /// Session-type-select payload for this kind.
    fn type_select(&self) -> &'static str {
        match self {
            Self::Event => "*99*1",
            Self::Command | Self::Test => "*99*0",
        }
    }

    /// Lowercase name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Command => "command",
            Self::Test => "test",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Negotiation state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No socket yet.
    Idle,
    /// TCP connect in progress.
    Connecting,
    /// Type-select frame written, awaiting its acknowledgement.
    AwaitingTypeAck,
    /// Awaiting the negotiation reply (challenge, nonce, ACK or NACK).
    AwaitingNegotiationAck,
    /// SHA challenge announced; exchanging nonces.
    AwaitingShaChallenge,
    /// Bare nonce received; legacy password path.
    AwaitingNonce,
    /// Proof sent, awaiting the gateway's own proof.
    AwaitingServerProof,
    /// Handshake complete; frames may flow.
    Authenticated,
    /// Gracefully closed.
    Closed,
    /// Negotiation failed; terminal.
    Failed(SessionFailure),
}

/// Outcome of a one-shot connectivity test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    /// Connection and authentication succeeded.
    Success,
    /// The attempt failed with a structured reason.
    Failed(SessionFailure),
}

impl TestOutcome {
    /// True when the gateway accepted the session.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// The failure reason, when the test failed.
    pub fn failure(&self) -> Option<SessionFailure> {
        match self {
            Self::Success => None,
            Self::Failed(reason) => Some(*reason),
        }
    }
}

/// One authenticated TCP connection to a gateway.
///
/// The session exclusively owns its socket; it is never shared across
/// concurrent users and never reused across reconnects.
#[derive(Debug)]
pub struct GatewaySession {
    gateway: Arc<Gateway>,
    kind: SessionKind,
    state: SessionState,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl GatewaySession {
    /// Open a session of the given kind, retrying transient faults per
    /// the kind's [`RetryPolicy`], and run the full negotiation and
    /// authentication handshake.
    pub async fn connect(gateway: Arc<Gateway>, kind: SessionKind) -> Result<Self> {
        match kind {
            SessionKind::Test => {
                Self::connect_with_policy(gateway, kind, RetryPolicy::TEST, false).await
            }
            SessionKind::Event | SessionKind::Command => {
                Self::connect_with_policy(gateway, kind, RetryPolicy::PERSISTENT, true).await
            }
        }
    }

    /// One-shot connectivity test against a gateway.
    ///
    /// Bounded like the original setup flow: three refused attempts at
    /// most, and a reset mid-handshake reports `password_retry` so the
    /// caller may re-prompt and re-enter.
    pub async fn test(gateway: Arc<Gateway>) -> TestOutcome {
        match Self::connect(gateway, SessionKind::Test).await {
            Ok(mut session) => {
                session.close().await;
                TestOutcome::Success
            }
            Err(OwnError::Session(reason)) => TestOutcome::Failed(reason),
            Err(err) => {
                // Anything else mid-test (reset, EOF, stray I/O fault) is
                // recoverable by re-entering the flow.
                error!("test session aborted: {err}");
                TestOutcome::Failed(SessionFailure::PasswordRetry)
            }
        }
    }

    async fn connect_with_policy(
        gateway: Arc<Gateway>,
        kind: SessionKind,
        policy: RetryPolicy,
        reset_retries: bool,
    ) -> Result<Self> {
        debug!("{} opening {} session", gateway.log_id(), kind);
        let mut refused = 0u32;

        loop {
            match Self::attempt(&gateway, kind).await {
                Ok(session) => return Ok(session),
                Err(err) if err.is_connection_reset() => {
                    if !reset_retries {
                        warn!("{} {} session connection reset", gateway.log_id(), kind);
                        return Err(SessionFailure::PasswordRetry.into());
                    }
                    warn!(
                        "{} {} session connection reset, retrying in {}s",
                        gateway.log_id(),
                        kind,
                        RESET_PAUSE.as_secs()
                    );
                    tokio::time::sleep(RESET_PAUSE).await;
                }
                Err(err)
                    if err.is_connection_refused()
                        || matches!(err, OwnError::IncompleteFrame) =>
                {
                    if !reset_retries && matches!(err, OwnError::IncompleteFrame) {
                        // Test path: the gateway hung up mid-handshake.
                        warn!("{} {} session closed mid-handshake", gateway.log_id(), kind);
                        return Err(SessionFailure::PasswordRetry.into());
                    }
                    refused += 1;
                    if refused >= policy.max_attempts {
                        error!(
                            "{} {} session connection still refused after {} attempts",
                            gateway.log_id(),
                            kind,
                            policy.max_attempts
                        );
                        return Err(SessionFailure::ConnectionRefused.into());
                    }
                    let delay = policy.delay(refused);
                    warn!(
                        "{} {} session connection refused, retrying in {}s",
                        gateway.log_id(),
                        kind,
                        delay.as_secs()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// One connection attempt: socket connect plus full negotiation.
    async fn attempt(gateway: &Arc<Gateway>, kind: SessionKind) -> Result<Self> {
        let stream = TcpStream::connect(gateway.socket_addr()).await?;
        let (read_half, write_half) = stream.into_split();
        let mut session = Self {
            gateway: Arc::clone(gateway),
            kind,
            state: SessionState::Connecting,
            reader: BufReader::new(read_half),
            writer: write_half,
        };
        session.negotiate().await?;
        Ok(session)
    }

    /// Current state of the negotiation state machine.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The kind this session was opened as.
    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// The gateway this session is connected to.
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// True once the handshake completed.
    pub fn is_authenticated(&self) -> bool {
        self.state == SessionState::Authenticated
    }

    /// Send one opaque frame on an authenticated session.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        if !self.is_authenticated() {
            return Err(OwnError::NotAuthenticated);
        }
        self.write_raw(frame).await
    }

    /// Receive the next frame on an authenticated session. Blocks until
    /// a full frame arrives or the connection drops.
    pub async fn receive_frame(&mut self) -> Result<Frame> {
        if !self.is_authenticated() {
            return Err(OwnError::NotAuthenticated);
        }
        frame::read_frame(&mut self.reader).await
    }

    /// [`receive_frame`](Self::receive_frame) under a deadline.
    pub async fn receive_frame_timeout(&mut self, deadline: Duration) -> Result<Frame> {
        if !self.is_authenticated() {
            return Err(OwnError::NotAuthenticated);
        }
        frame::read_frame_timeout(&mut self.reader, deadline).await
    }

    /// Gracefully shut the writer down and release the socket.
    ///
    /// Idempotent; safe to call on a session that never reached
    /// `Authenticated`.
    pub async fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Err(err) = self.writer.shutdown().await {
            debug!("{} error shutting down writer: {err}", self.gateway.log_id());
        }
        self.state = SessionState::Closed;
        debug!("{} {} session closed", self.gateway.log_id(), self.kind);
    }

    // ---- negotiation state machine ----

    async fn negotiate(&mut self) -> Result<()> {
        debug!("{} negotiating {} session", self.gateway.log_id(), self.kind);

        self.state = SessionState::AwaitingTypeAck;
        self.write_raw(&Frame::from_payload(self.kind.type_select()))
            .await?;

        let reply = self.read().await?;
        if classify(&reply) == SignalingMessage::Nack {
            error!(
                "{} error while opening {} session: type select refused",
                self.gateway.log_id(),
                self.kind
            );
            return self.fail(SessionFailure::ConnectionRefused);
        }

        self.state = SessionState::AwaitingNegotiationAck;
        let reply = self.read().await?;
        match classify(&reply) {
            SignalingMessage::Nack => {
                error!(
                    "{} error while opening {} session: negotiation refused",
                    self.gateway.log_id(),
                    self.kind
                );
                self.fail(SessionFailure::NegotiationRefused)
            }
            SignalingMessage::Ack => {
                // Open gateway, no authentication required.
                self.established();
                Ok(())
            }
            SignalingMessage::ShaChallenge(method) => self.sha_handshake(method).await,
            SignalingMessage::Nonce(nonce) => self.legacy_handshake(&nonce).await,
            SignalingMessage::Other => {
                error!(
                    "{} unexpected negotiation reply `{}`",
                    self.gateway.log_id(),
                    reply
                );
                self.fail(SessionFailure::NegotiationRefused)
            }
        }
    }

    /// SHA challenge-response handshake with mutual authentication.
    async fn sha_handshake(&mut self, method: HashMethod) -> Result<()> {
        self.state = SessionState::AwaitingShaChallenge;
        debug!(
            "{} received {} challenge",
            self.gateway.log_id(),
            method
        );

        let Some(password) = self.gateway.password().map(str::to_owned) else {
            warn!(
                "{} connection requires a password but none was provided",
                self.gateway.log_id()
            );
            self.write_raw(&Frame::nack()).await?;
            return self.fail(SessionFailure::PasswordRequired);
        };

        debug!(
            "{} accepting {} challenge, initiating handshake",
            self.gateway.log_id(),
            method
        );
        self.write_raw(&Frame::ack()).await?;

        let reply = self.read().await?;
        let SignalingMessage::Nonce(ra) = classify(&reply) else {
            error!(
                "{} expected server nonce, got `{}`",
                self.gateway.log_id(),
                reply
            );
            return self.fail(SessionFailure::NegotiationRefused);
        };

        let rb = auth::generate_client_nonce(method);
        let proof = auth::client_proof(method, &password, &ra, &rb);
        let expected = auth::server_proof(method, &password, &ra, &rb);

        debug!(
            "{} sending {} session password",
            self.gateway.log_id(),
            self.kind
        );
        self.write_raw(&Frame::from_payload(&format!("*#{rb}*{proof}")))
            .await?;
        self.state = SessionState::AwaitingServerProof;

        let reply = match frame::read_frame_timeout(&mut self.reader, AUTH_REPLY_TIMEOUT).await {
            Ok(reply) => reply,
            Err(OwnError::Timeout(_) | OwnError::IncompleteFrame) => {
                error!(
                    "{} password error while opening {} session",
                    self.gateway.log_id(),
                    self.kind
                );
                return self.fail(SessionFailure::PasswordError);
            }
            Err(err) => return Err(err),
        };

        match classify(&reply) {
            SignalingMessage::Nonce(server_reply) if server_reply == expected => {
                self.write_raw(&Frame::ack()).await?;
                self.established();
                Ok(())
            }
            SignalingMessage::Nonce(_) => {
                // Client-detected server-authenticity failure, distinct
                // from a server-reported NACK.
                error!(
                    "{} server identity could not be confirmed",
                    self.gateway.log_id()
                );
                self.write_raw(&Frame::nack()).await?;
                self.fail(SessionFailure::NegotiationError)
            }
            _ => {
                error!(
                    "{} password error while opening {} session",
                    self.gateway.log_id(),
                    self.kind
                );
                self.fail(SessionFailure::PasswordError)
            }
        }
    }

    /// Legacy bare-nonce handshake.
    async fn legacy_handshake(&mut self, nonce: &str) -> Result<()> {
        self.state = SessionState::AwaitingNonce;
        debug!("{} received nonce", self.gateway.log_id());

        let Some(password) = self.gateway.password().map(str::to_owned) else {
            warn!(
                "{} connection requires a password but none was provided",
                self.gateway.log_id()
            );
            self.write_raw(&Frame::nack()).await?;
            return self.fail(SessionFailure::PasswordRequired);
        };

        let transformed = match auth::legacy_password(&password, nonce) {
            Ok(transformed) => transformed,
            Err(err) => {
                error!("{} {err}", self.gateway.log_id());
                self.write_raw(&Frame::nack()).await?;
                return self.fail(SessionFailure::PasswordError);
            }
        };

        debug!(
            "{} sending {} session password",
            self.gateway.log_id(),
            self.kind
        );
        self.write_raw(&Frame::from_payload(&format!("*#{transformed}")))
            .await?;

        let reply = self.read().await?;
        if classify(&reply) == SignalingMessage::Nack {
            error!(
                "{} password error while opening {} session",
                self.gateway.log_id(),
                self.kind
            );
            return self.fail(SessionFailure::PasswordError);
        }
        self.established();
        Ok(())
    }

    fn established(&mut self) {
        self.state = SessionState::Authenticated;
        debug!(
            "{} {} session established successfully",
            self.gateway.log_id(),
            self.kind
        );
    }

    fn fail(&mut self, reason: SessionFailure) -> Result<()> {
        self.state = SessionState::Failed(reason);
        Err(reason.into())
    }

    async fn read(&mut self) -> Result<Frame> {
        frame::read_frame(&mut self.reader).await
    }

    async fn write_raw(&mut self, frame: &Frame) -> Result<()> {
        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
