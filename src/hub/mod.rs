//! Broadcast Hub
//!
//! Keeps the set of connected peers, relays every message a peer sends to
//! all of them, evicts peers that stop answering, and drains everything on
//! shutdown.
//!
//! ## Architecture
//!
//! - **Router**: one task owns the registry and processes [`HubEvent`]s in
//!   arrival order; [`Hub`] is the cloneable handle that queues them
//! - **Connection**: serialized write path and exclusive reader per peer
//! - **Liveness**: read deadline plus a periodic ping per connection
//! - **Shutdown**: close frames, grace period, bounded wait for sessions
//! - **Handler**: axum WebSocket upgrade and the transport adapters
//!
//! ## Example
//!
//! ```rust,ignore
//! use herald::hub::{Frame, Hub, HubConfig};
//!
//! let hub = Hub::start(HubConfig::default())?;
//! hub.accept("127.0.0.1:50000", sink, source).await?;
//! hub.broadcast(Frame::text("hello")).await?;
//!
//! let report = hub.shutdown().await;
//! println!("closed {} connections", report.closed_connections);
//! ```

mod config;
mod connection;
mod error;
mod event;
mod frame;
mod handler;
mod liveness;
mod router;
mod session;
mod shutdown;
mod transport;

#[cfg(test)]
mod mock;

pub use config::HubConfig;
pub use connection::{Connection, ConnectionId, ConnectionReader};
pub use error::{HubError, HubResult};
pub use event::HubEvent;
pub use frame::{Frame, FrameKind, CLOSE_GOING_AWAY, CLOSE_NORMAL};
pub use handler::{websocket_handler, WsSink, WsSource};
pub use liveness::{Liveness, LivenessState};
pub use router::Hub;
pub use shutdown::ShutdownReport;
pub use transport::{FrameSink, FrameSource, TransportError};
