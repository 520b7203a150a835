//! Message-decoding collaborator boundary.
//!
//! Translating raw frames into domain events (lighting, climate, energy,
//! ...) lives outside this crate. The handler hands every authenticated
//! event frame to a [`FrameDecoder`] and republishes whatever typed event
//! comes back; frames the decoder does not understand are logged and
//! dropped.

use thiserror::Error;

use crate::frame::Frame;

/// Decode failures.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame is well-formed but not one this decoder understands.
    #[error("unsupported frame: {0}")]
    UnsupportedFrame(String),

    /// The frame violates the decoder's expected structure.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Turns an authenticated event frame into a typed domain event.
pub trait FrameDecoder: Send + Sync + 'static {
    /// The typed event republished to subscribers.
    type Event: Clone + Send + 'static;

    /// Decode one frame.
    fn decode(&self, frame: &Frame) -> Result<Self::Event, DecodeError>;
}

/// Passthrough decoder: every frame is its own event.
///
/// Lets the handler run without a domain decoder, e.g. for raw bus
/// monitoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder;

impl FrameDecoder for RawDecoder {
    type Event = Frame;

    fn decode(&self, frame: &Frame) -> Result<Self::Event, DecodeError> {
        Ok(frame.clone())
    }
}
