//! # Herald
//!
//! Real-time WebSocket broadcast hub: every message a connected peer sends
//! is relayed to all connected peers.
//!
//! ## Features
//!
//! - **Single-writer registry**: one router task owns the set of connections
//! - **Concurrent fan-out**: each broadcast is written to all peers at once
//! - **Liveness**: periodic pings and a read deadline evict dead peers
//! - **Orderly drain**: close frames, a grace period and a bounded wait
//!
//! ## Modules
//!
//! - [`hub`]: Broadcast router, connections, liveness and shutdown
//! - [`api`]: HTTP router with the WebSocket route and health checks
//! - [`server`]: Listener lifecycle
//! - [`client`]: Interactive terminal client
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use herald::{Config, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::start(&Config::default()).await?;
//!     println!("Listening on {}", server.local_addr());
//!
//!     herald::server::shutdown_signal().await;
//!
//!     let report = server.shutdown().await;
//!     println!("Closed {} connections", report.closed_connections);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod hub;
pub mod server;

pub use api::{build_router, AppState};

pub use client::ClientError;

pub use config::{Config, ConfigError, HubSettings, LoggingConfig, ServerConfig};

pub use hub::{
    Connection, ConnectionId, Frame, FrameKind, FrameSink, FrameSource, Hub, HubConfig, HubError,
    HubEvent, HubResult, ShutdownReport, TransportError,
};

pub use server::{Server, ServerError};
