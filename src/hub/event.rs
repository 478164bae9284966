//! Router events
//!
//! Every mutation of the registry and every outbound write is requested by
//! queueing one of these. Keepalive pings and pongs travel as `DirectSend`
//! like any other targeted write.

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;

use super::connection::Connection;
use super::frame::Frame;

/// An event processed by the router, strictly in arrival order
pub enum HubEvent {
    /// Add a connection to the registry
    Register(Arc<Connection>),
    /// Close a connection and drop it from the registry
    Unregister(Arc<Connection>),
    /// Fan a frame out to every registered connection
    Broadcast(Frame),
    /// Write a frame to a single connection
    DirectSend(Arc<Connection>, Frame),
    /// Drain the registry and stop; the sender is notified with the number
    /// of connections that were closed
    Shutdown(oneshot::Sender<usize>),
}

impl HubEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HubEvent::Register(_) => "register",
            HubEvent::Unregister(_) => "unregister",
            HubEvent::Broadcast(_) => "broadcast",
            HubEvent::DirectSend(_, _) => "direct_send",
            HubEvent::Shutdown(_) => "shutdown",
        }
    }
}

impl fmt::Debug for HubEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HubEvent::Register(conn) | HubEvent::Unregister(conn) => {
                write!(f, "{}({})", self.name(), conn.id())
            }
            HubEvent::Broadcast(frame) => {
                write!(f, "broadcast({}, {} bytes)", frame.kind, frame.len())
            }
            HubEvent::DirectSend(conn, frame) => {
                write!(f, "direct_send({}, {})", conn.id(), frame.kind)
            }
            HubEvent::Shutdown(_) => f.write_str("shutdown"),
        }
    }
}
