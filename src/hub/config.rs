//! Hub configuration
//!
//! Fixed at construction. [`HubConfig::validate`] runs before the router is
//! spawned, so an invalid configuration never accepts a connection.

use std::time::Duration;

use super::error::HubError;

/// Configuration for the broadcast hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Number of expected peers; sizes the event queue
    pub expected_peers: usize,
    /// A peer is presumed dead after this long without any inbound frame
    pub ping_timeout: Duration,
    /// How often the server pings each peer. Must be below `ping_timeout`
    pub ping_interval: Duration,
    /// Time given to peers to answer the close frame during shutdown
    pub close_grace_period: Duration,
    /// Bound on delivering the close frame during shutdown
    pub close_grace_write_timeout: Duration,
    /// Bound on each broadcast or direct write; `None` waits indefinitely
    pub write_timeout: Option<Duration>,
    /// Overall bound on shutdown
    pub shutdown_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            expected_peers: 10,
            ping_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(5),
            close_grace_period: Duration::from_millis(10),
            close_grace_write_timeout: Duration::from_millis(10),
            write_timeout: Some(Duration::from_secs(10)),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl HubConfig {
    /// Check the keepalive invariant: at least one ping must go out before
    /// an idle but healthy peer hits its read deadline.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.ping_interval.is_zero() {
            return Err(HubError::InvalidConfig(
                "ping interval must be greater than zero".to_string(),
            ));
        }
        if self.ping_interval >= self.ping_timeout {
            return Err(HubError::InvalidConfig(format!(
                "ping interval ({:?}) must be less than ping timeout ({:?})",
                self.ping_interval, self.ping_timeout
            )));
        }
        Ok(())
    }

    /// Capacity of the router's event queue
    pub fn queue_capacity(&self) -> usize {
        self.expected_peers.max(1)
    }
}
