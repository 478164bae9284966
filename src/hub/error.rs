//! Hub error types
//!
//! Errors surfaced by the hub to its callers. Per-connection failures never
//! show up here: they are contained and turned into unregistrations.

use thiserror::Error;

use super::transport::TransportError;

/// Errors that can occur when constructing or talking to the hub
#[derive(Error, Debug)]
pub enum HubError {
    /// Configuration rejected at construction time
    #[error("Invalid hub configuration: {0}")]
    InvalidConfig(String),

    /// The hub has shut down and no longer accepts events
    #[error("Hub is closed")]
    Closed,

    /// Transport-level failure on a single connection
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for hub operations
pub type HubResult<T> = Result<T, HubError>;
