//! Shutdown Coordinator
//!
//! [`Hub::shutdown`] asks the router to drain, waits for the per-connection
//! sessions to finish, and returns shortly after `shutdown_timeout` even
//! when a peer never answers the close frame. A router that misses the
//! deadline is aborted and every accepted connection is closed directly.

use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;

use super::config::HubConfig;
use super::connection::Connection;
use super::event::HubEvent;
use super::frame::Frame;
use super::router::Hub;

/// How long sessions get to exit after a forced close
const FORCE_CLOSE_WAIT: Duration = Duration::from_millis(100);

/// Outcome of a hub shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Connections that were sent a close frame and closed
    pub closed_connections: usize,
    /// Whether every session finished before the deadline
    pub drained: bool,
}

impl Hub {
    /// Drain the hub and wait for every session to finish.
    ///
    /// New events are rejected from the moment this is called. Only the
    /// first call does the work; later calls return the same report.
    pub async fn shutdown(&self) -> ShutdownReport {
        *self.inner.report.get_or_init(|| self.drain()).await
    }

    async fn drain(&self) -> ShutdownReport {
        self.inner.shutting_down.store(true, Ordering::Release);
        let deadline = Instant::now() + self.inner.config.shutdown_timeout;
        tracing::info!(
            connections = self.connection_count(),
            in_flight = self.in_flight(),
            "Shutting down broadcast hub"
        );

        let (done_tx, done_rx) = oneshot::channel();
        let router_drain = async {
            self.inner.events.send(HubEvent::Shutdown(done_tx)).await.ok()?;
            done_rx.await.ok()
        };

        let (closed_connections, wait_until) =
            match tokio::time::timeout_at(deadline, router_drain).await {
                Ok(closed) => (closed.unwrap_or(0), deadline),
                Err(_) => {
                    tracing::warn!(
                        "Router did not drain before the shutdown deadline, aborting it"
                    );
                    if let Some(router) = self.inner.router.lock().await.take() {
                        router.abort();
                        let _ = router.await;
                    }
                    let closed = self.force_close().await;
                    (closed, Instant::now() + FORCE_CLOSE_WAIT)
                }
            };

        let drained = wait_for_handlers(&self.inner.tracker, wait_until).await;

        if let Some(router) = self.inner.router.lock().await.take() {
            let _ = router.await;
        }

        tracing::info!(closed_connections, drained, "Broadcast hub stopped");
        ShutdownReport {
            closed_connections,
            drained,
        }
    }

    /// Close every accepted connection that is still open, without the
    /// router. Returns the number this call closed.
    async fn force_close(&self) -> usize {
        let connections: Vec<Arc<Connection>> = self
            .inner
            .accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .filter_map(|connection| connection.upgrade())
            .collect();

        let closed = join_all(connections.iter().map(|connection| connection.close()))
            .await
            .into_iter()
            .filter(|closed| *closed)
            .count();

        // The aborted router can no longer publish
        self.inner.count.send_replace(0);
        tracing::warn!(closed, "Force-closed remaining connections");
        closed
    }
}

/// Send every connection a going-away close frame, give the peers the grace
/// period to react, then close all of them. Returns the number closed.
pub(crate) async fn drain_connections(
    connections: Vec<Arc<Connection>>,
    config: &HubConfig,
) -> usize {
    if connections.is_empty() {
        return 0;
    }

    let frame = Arc::new(Frame::going_away());
    let limit = Some(config.close_grace_write_timeout);

    let mut writes = JoinSet::new();
    for connection in &connections {
        let connection = Arc::clone(connection);
        let frame = Arc::clone(&frame);
        writes.spawn(async move {
            if let Err(e) = connection.send_timeout(&frame, limit).await {
                tracing::debug!(
                    connection_id = %connection.id(),
                    error = %e,
                    "Close frame not delivered"
                );
            }
        });
    }
    while writes.join_next().await.is_some() {}

    tokio::time::sleep(config.close_grace_period).await;

    join_all(connections.iter().map(|connection| connection.close())).await;
    tracing::info!(closed = connections.len(), "Closed all connections");
    connections.len()
}

/// Wait for tracked sessions until `deadline`. Returns `false` if some were
/// still running when it passed.
pub(crate) async fn wait_for_handlers(tracker: &TaskTracker, deadline: Instant) -> bool {
    tracker.close();
    match tokio::time::timeout_at(deadline, tracker.wait()).await {
        Ok(()) => true,
        Err(_) => {
            tracing::warn!(
                in_flight = tracker.len(),
                "Sessions still running at shutdown deadline"
            );
            false
        }
    }
}
