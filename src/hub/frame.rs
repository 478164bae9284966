//! Frame Types
//!
//! The unit exchanged with a peer. The hub never looks inside a data
//! payload; it only cares about the kind tag.

use std::fmt;

/// Close status for a normal closure
pub const CLOSE_NORMAL: u16 = 1000;

/// Close status sent when the server is going away
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Kind tag carried by every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// UTF-8 data frame
    Text,
    /// Opaque binary data frame
    Binary,
    /// Keepalive request
    Ping,
    /// Keepalive answer
    Pong,
    /// Closing handshake
    Close,
}

impl FrameKind {
    /// Control frames are ping, pong and close
    pub fn is_control(self) -> bool {
        matches!(self, FrameKind::Ping | FrameKind::Pong | FrameKind::Close)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Text => "text",
            FrameKind::Binary => "binary",
            FrameKind::Ping => "ping",
            FrameKind::Pong => "pong",
            FrameKind::Close => "close",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message unit: kind tag plus raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(kind: FrameKind, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(FrameKind::Text, text.into().into_bytes())
    }

    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(FrameKind::Binary, data)
    }

    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(FrameKind::Ping, data)
    }

    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(FrameKind::Pong, data)
    }

    /// Build a close frame. The payload is the wire layout of a close body:
    /// a big-endian status code followed by the UTF-8 reason.
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = Vec::with_capacity(2 + reason.len());
        payload.extend_from_slice(&code.to_be_bytes());
        payload.extend_from_slice(reason.as_bytes());
        Self::new(FrameKind::Close, payload)
    }

    /// Close frame sent to every peer during shutdown
    pub fn going_away() -> Self {
        Self::close(CLOSE_GOING_AWAY, "Bye")
    }

    /// Status code of a close frame, if present
    pub fn close_code(&self) -> Option<u16> {
        if self.kind != FrameKind::Close || self.payload.len() < 2 {
            return None;
        }
        Some(u16::from_be_bytes([self.payload[0], self.payload[1]]))
    }

    /// Reason text of a close frame (empty when absent)
    pub fn close_reason(&self) -> String {
        if self.kind != FrameKind::Close || self.payload.len() <= 2 {
            return String::new();
        }
        String::from_utf8_lossy(&self.payload[2..]).into_owned()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
