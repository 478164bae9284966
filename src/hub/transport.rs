//! Transport boundary
//!
//! The hub does not speak the wire protocol itself. Anything that can send
//! and receive tagged frames can be plugged in through these two traits;
//! [`super::handler`] provides the implementation for axum WebSockets.

use async_trait::async_trait;
use thiserror::Error;

use super::frame::{Frame, CLOSE_GOING_AWAY, CLOSE_NORMAL};

/// Failures reported by a framed channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The channel is closed (peer close frame, stream end, or local close)
    #[error("Connection closed (code: {code:?}, reason: {reason:?})")]
    Closed { code: Option<u16>, reason: String },

    /// A deadline elapsed before the operation completed
    #[error("Operation timed out")]
    TimedOut,

    /// The peer violated the framing protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Underlying socket failure
    #[error("IO error: {0}")]
    Io(String),
}

impl TransportError {
    /// Closed without any status
    pub fn closed() -> Self {
        TransportError::Closed {
            code: None,
            reason: String::new(),
        }
    }

    /// Whether the failure is an ordinary end of conversation.
    ///
    /// Only used to pick a log level.
    pub fn is_expected_closure(&self) -> bool {
        match self {
            TransportError::Closed { code: None, .. } => true,
            TransportError::Closed {
                code: Some(code), ..
            } => *code == CLOSE_NORMAL || *code == CLOSE_GOING_AWAY,
            _ => false,
        }
    }
}

/// Write half of a framed channel
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Write one frame
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError>;

    /// Shut the write half down
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a framed channel
///
/// A terminal error is returned once the peer has gone away; callers stop
/// reading after the first error.
#[async_trait]
pub trait FrameSource: Send + 'static {
    async fn recv(&mut self) -> Result<Frame, TransportError>;
}
