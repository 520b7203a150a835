//! Error types for the OpenWebNet client.
//!
//! Two layers of errors exist:
//!
//! - [`SessionFailure`] is the closed set of negotiation outcomes a caller
//!   must act on (re-prompt for a password, abort setup, ...). Exactly one
//!   reason is produced per failed session attempt.
//! - [`OwnError`] is the crate-wide error covering transport faults, frame
//!   faults and everything else, with `SessionFailure` embedded.
//!
//! Transient transport faults (connection refused/reset) are retried
//! internally by the session layer and only surface once the retry budget
//! is exhausted.

use std::time::Duration;

use thiserror::Error;

/// Closed enumeration of session negotiation failures.
///
/// These are the reasons surfaced to interactive setup or to the
/// reconnection supervisor; the wire codes returned by [`as_code`] are
/// stable.
///
/// [`as_code`]: SessionFailure::as_code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum SessionFailure {
    /// TCP connection refused (retry budget exhausted) or the gateway
    /// NACKed the session-type-select frame.
    #[error("connection refused by gateway")]
    ConnectionRefused,

    /// The gateway NACKed the negotiation reply.
    #[error("session negotiation refused by gateway")]
    NegotiationRefused,

    /// The gateway demands authentication but no password is configured.
    #[error("gateway requires a password but none was provided")]
    PasswordRequired,

    /// The gateway rejected the supplied credentials, or the proof reply
    /// timed out.
    #[error("gateway rejected the password")]
    PasswordError,

    /// Connection reset during a one-shot connection test; the caller may
    /// re-enter the flow with a fresh password.
    #[error("connection dropped during authentication, retry with password")]
    PasswordRetry,

    /// The server proof did not match the locally computed expectation.
    /// This is a client-detected server-authenticity failure, distinct
    /// from a server-reported NACK.
    #[error("gateway identity could not be confirmed")]
    NegotiationError,
}

impl SessionFailure {
    /// Stable snake_case code for this failure, as surfaced to
    /// configuration front-ends.
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::ConnectionRefused => "connection_refused",
            Self::NegotiationRefused => "negotiation_refused",
            Self::PasswordRequired => "password_required",
            Self::PasswordError => "password_error",
            Self::PasswordRetry => "password_retry",
            Self::NegotiationError => "negotiation_error",
        }
    }

    /// Whether interactive setup should re-prompt for a password rather
    /// than abort.
    pub fn is_password_related(&self) -> bool {
        matches!(
            self,
            Self::PasswordRequired | Self::PasswordError | Self::PasswordRetry
        )
    }
}

/// OpenWebNet client errors.
#[derive(Debug, Error)]
pub enum OwnError {
    /// Session negotiation failed with a structured reason.
    #[error("session failure: {0}")]
    Session(#[from] SessionFailure),

    /// The connection closed before a frame terminator was seen.
    #[error("connection closed mid-frame")]
    IncompleteFrame,

    /// A read deadline elapsed before a full frame arrived.
    #[error("timed out after {0:?} waiting for a frame")]
    Timeout(Duration),

    /// A frame violated the wire format.
    #[error("malformed frame: {0}")]
    Frame(String),

    /// The password cannot be used with the negotiated method (e.g. a
    /// non-numeric password on the legacy nonce path).
    #[error("unusable password: {0}")]
    Password(String),

    /// An operation requires an authenticated session.
    #[error("session not authenticated")]
    NotAuthenticated,

    /// The handler is shut down or a completion channel was dropped.
    #[error("channel closed")]
    ChannelClosed,

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for OpenWebNet operations.
pub type Result<T> = std::result::Result<T, OwnError>;

impl From<toml::de::Error> for OwnError {
    fn from(err: toml::de::Error) -> Self {
        OwnError::Config(err.to_string())
    }
}

impl OwnError {
    /// True when the underlying fault is a TCP connection reset.
    pub(crate) fn is_connection_reset(&self) -> bool {
        matches!(self, OwnError::Io(e) if e.kind() == std::io::ErrorKind::ConnectionReset)
    }

    /// True when the underlying fault is a TCP connection refusal. A
    /// misconfigured address with no route surfaces differently from the
    /// transport but shares the same bounded retry budget.
    pub(crate) fn is_connection_refused(&self) -> bool {
        matches!(
            self,
            OwnError::Io(e) if matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::HostUnreachable
                    | std::io::ErrorKind::NetworkUnreachable
            )
        )
    }
}
