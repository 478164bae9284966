//! Data Transfer Objects
//!
//! Response types for the HTTP endpoints, serialized to JSON.

use serde::Serialize;

/// Full health status
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy or shutting_down
    pub status: String,
    /// Currently registered WebSocket connections
    pub connections: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
