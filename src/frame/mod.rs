//! OpenWebNet frame codec.
//!
//! Frames are ASCII strings of the form `*<fields>##`, always terminated
//! by the two-byte separator `##`. The codec reads exactly one frame at a
//! time from a buffered stream and classifies signaling frames:
//!
//! | Frame      | Meaning                     |
//! |------------|-----------------------------|
//! | `*#*1##`   | ACK                         |
//! | `*#*0##`   | NACK                        |
//! | `*98*1##`  | SHA-1 challenge follows     |
//! | `*98*2##`  | SHA-256 challenge follows   |
//! | `*#<n>##`  | Nonce / proof payload       |
//! | anything else | Opaque event/command frame |

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::auth::HashMethod;
use crate::error::{OwnError, Result};

/// The two-byte frame terminator.
pub const SEPARATOR: &[u8] = b"##";

/// ACK signaling frame.
pub const ACK_FRAME: &str = "*#*1##";

/// NACK signaling frame.
pub const NACK_FRAME: &str = "*#*0##";

/// One delimited protocol message unit, terminator included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(String);

impl Frame {
    /// Build a frame from a payload, appending the terminator.
    ///
    /// The payload must not itself contain the terminator sequence; the
    /// codec performs no escaping.
    pub fn from_payload(payload: &str) -> Self {
        debug_assert!(
            !payload.contains("##"),
            "frame payload must not contain the terminator"
        );
        Self(format!("{payload}##"))
    }

    /// Build a frame from bytes read off the wire.
    ///
    /// The bytes must be ASCII and end with the terminator.
    pub fn from_wire(bytes: Vec<u8>) -> Result<Self> {
        if !bytes.ends_with(SEPARATOR) {
            return Err(OwnError::Frame(format!(
                "missing terminator in {:?}",
                String::from_utf8_lossy(&bytes)
            )));
        }
        if !bytes.is_ascii() {
            return Err(OwnError::Frame(format!(
                "non-ASCII bytes in {:?}",
                String::from_utf8_lossy(&bytes)
            )));
        }
        // ASCII was just checked, so this cannot fail.
        let text = String::from_utf8(bytes).map_err(|e| OwnError::Frame(e.to_string()))?;
        Ok(Self(text))
    }

    /// The ACK signaling frame.
    pub fn ack() -> Self {
        Self(ACK_FRAME.to_string())
    }

    /// The NACK signaling frame.
    pub fn nack() -> Self {
        Self(NACK_FRAME.to_string())
    }

    /// Full frame text, terminator included.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encoded wire bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Frame text without the trailing terminator.
    pub fn payload(&self) -> &str {
        self.0.strip_suffix("##").unwrap_or(&self.0)
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Frame {
    type Err = OwnError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_wire(s.as_bytes().to_vec())
    }
}

/// A decoded signaling frame.
///
/// Exactly one classification holds per frame; classification is derived
/// from fixed literal prefixes. Non-signaling traffic (events, command
/// replies) classifies as [`SignalingMessage::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingMessage {
    /// Positive acknowledgement, `*#*1##`.
    Ack,
    /// Negative acknowledgement, `*#*0##`.
    Nack,
    /// The gateway demands a SHA challenge-response handshake.
    ShaChallenge(HashMethod),
    /// A nonce or proof payload, `*#<digits>##`.
    Nonce(String),
    /// Opaque non-signaling frame.
    Other,
}

/// Classify a frame as a signaling message.
pub fn classify(frame: &Frame) -> SignalingMessage {
    match frame.as_str() {
        ACK_FRAME => SignalingMessage::Ack,
        NACK_FRAME => SignalingMessage::Nack,
        "*98*1##" => SignalingMessage::ShaChallenge(HashMethod::Sha1),
        "*98*2##" => SignalingMessage::ShaChallenge(HashMethod::Sha256),
        other => {
            let interior = other.strip_prefix("*#").and_then(|r| r.strip_suffix("##"));
            match interior {
                Some(digits)
                    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) =>
                {
                    SignalingMessage::Nonce(digits.to_string())
                }
                _ => SignalingMessage::Other,
            }
        }
    }
}

/// Read one frame off the stream, consuming bytes up to and including the
/// first occurrence of the terminator.
///
/// Fails with [`OwnError::IncompleteFrame`] if the connection closes
/// before a terminator is seen.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        let n = reader.read_until(b'#', &mut buf).await?;
        if n == 0 {
            return Err(OwnError::IncompleteFrame);
        }
        if buf.ends_with(SEPARATOR) {
            return Frame::from_wire(buf);
        }
    }
}

/// [`read_frame`] under a deadline.
///
/// The authentication-proof-reply step reads under a 5-second deadline;
/// command workers reuse this for response reads.
pub async fn read_frame_timeout<R>(reader: &mut R, deadline: Duration) -> Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    tokio::time::timeout(deadline, read_frame(reader))
        .await
        .map_err(|_| OwnError::Timeout(deadline))?
}
