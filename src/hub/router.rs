//! Broadcast Router
//!
//! The router is a single task that owns the registry of live connections.
//! Everything that touches the registry arrives as a [`HubEvent`] on one
//! bounded queue and is handled to completion before the next event is
//! dequeued, so the registry needs no lock.
//!
//! [`Hub`] is the cloneable handle the rest of the program talks to. Its
//! methods only enqueue; none of them wait for the event to be processed,
//! except [`Hub::shutdown`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, Weak};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{watch, Mutex, OnceCell};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::task::TaskTracker;

use super::config::HubConfig;
use super::connection::{Connection, ConnectionId};
use super::error::{HubError, HubResult};
use super::event::HubEvent;
use super::frame::Frame;
use super::session;
use super::shutdown::{self, ShutdownReport};
use super::transport::{FrameSink, FrameSource};

/// Handle to a running broadcast hub
#[derive(Clone)]
pub struct Hub {
    pub(super) inner: Arc<HubInner>,
}

pub(super) struct HubInner {
    pub(super) events: mpsc::Sender<HubEvent>,
    pub(super) config: HubConfig,
    /// In-flight per-connection handlers
    pub(super) tracker: TaskTracker,
    /// Accepted connections, reachable even if the router is aborted
    pub(super) accepted: std::sync::Mutex<Vec<Weak<Connection>>>,
    pub(super) count: Arc<watch::Sender<usize>>,
    pub(super) shutting_down: AtomicBool,
    pub(super) router: Mutex<Option<JoinHandle<()>>>,
    pub(super) report: OnceCell<ShutdownReport>,
}

impl Hub {
    /// Validate the configuration and spawn the router task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: HubConfig) -> HubResult<Hub> {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::channel(config.queue_capacity());
        let (count, _) = watch::channel(0);
        let count = Arc::new(count);

        let router = Router {
            config: config.clone(),
            registry: HashMap::new(),
            events: events_rx,
            requeue: events_tx.downgrade(),
            count: Arc::clone(&count),
        };
        let handle = tokio::spawn(router.run());

        tracing::info!(
            expected_peers = config.expected_peers,
            ping_interval = ?config.ping_interval,
            ping_timeout = ?config.ping_timeout,
            "Broadcast hub started"
        );

        Ok(Hub {
            inner: Arc::new(HubInner {
                events: events_tx,
                config,
                tracker: TaskTracker::new(),
                accepted: std::sync::Mutex::new(Vec::new()),
                count,
                shutting_down: AtomicBool::new(false),
                router: Mutex::new(Some(handle)),
                report: OnceCell::new(),
            }),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Hand over an upgraded channel.
    ///
    /// Wraps it in a [`Connection`] and starts its read task and keepalive
    /// pinger. Registration itself happens on the router.
    pub async fn accept<S, R>(
        &self,
        id: impl Into<ConnectionId>,
        sink: S,
        source: R,
    ) -> HubResult<Arc<Connection>>
    where
        S: FrameSink,
        R: FrameSource,
    {
        let (connection, reader) = Connection::new(
            id,
            sink,
            source,
            self.inner.config.close_grace_write_timeout,
        );

        // Checked under the lock so a forced drain cannot miss this one
        let admitted = {
            let mut accepted = self
                .inner
                .accepted
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if self.is_shutting_down() {
                false
            } else {
                accepted.retain(|c| c.strong_count() > 0);
                accepted.push(Arc::downgrade(&connection));
                true
            }
        };
        if !admitted {
            connection.close().await;
            return Err(HubError::Closed);
        }

        self.inner.tracker.spawn(session::run(
            self.clone(),
            Arc::clone(&connection),
            reader,
        ));
        Ok(connection)
    }

    /// Queue a connection for registration
    pub async fn register(&self, connection: Arc<Connection>) -> HubResult<()> {
        self.enqueue(HubEvent::Register(connection)).await
    }

    /// Queue a connection for removal. Safe to call more than once.
    pub async fn unregister(&self, connection: Arc<Connection>) -> HubResult<()> {
        self.enqueue(HubEvent::Unregister(connection)).await
    }

    /// Queue a frame for delivery to every registered connection
    pub async fn broadcast(&self, frame: Frame) -> HubResult<()> {
        self.enqueue(HubEvent::Broadcast(frame)).await
    }

    /// Queue a frame for delivery to one connection
    pub async fn send_to(&self, connection: &Arc<Connection>, frame: Frame) -> HubResult<()> {
        self.enqueue(HubEvent::DirectSend(Arc::clone(connection), frame))
            .await
    }

    /// Registry size as of the last processed register/unregister
    pub fn connection_count(&self) -> usize {
        *self.inner.count.borrow()
    }

    /// Receiver that is notified after every register/unregister
    pub fn watch_connections(&self) -> watch::Receiver<usize> {
        self.inner.count.subscribe()
    }

    /// Number of per-connection handlers still running
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Acquire)
    }

    async fn enqueue(&self, event: HubEvent) -> HubResult<()> {
        if self.is_shutting_down() {
            tracing::trace!(event = ?event, "Hub shutting down, event rejected");
            return Err(HubError::Closed);
        }
        self.inner
            .events
            .send(event)
            .await
            .map_err(|_| HubError::Closed)
    }
}

/// The single writer of the registry
struct Router {
    config: HubConfig,
    registry: HashMap<ConnectionId, Arc<Connection>>,
    events: mpsc::Receiver<HubEvent>,
    /// Used to queue unregistrations for failed writes. Weak so that dropping
    /// every [`Hub`] handle still ends the loop.
    requeue: mpsc::WeakSender<HubEvent>,
    count: Arc<watch::Sender<usize>>,
}

impl Router {
    async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            tracing::trace!(event = ?event, "Processing hub event");
            match event {
                HubEvent::Register(connection) => self.register(connection).await,
                HubEvent::Unregister(connection) => self.unregister(connection).await,
                HubEvent::Broadcast(frame) => self.broadcast(frame).await,
                HubEvent::DirectSend(connection, frame) => self.send_to(connection, frame).await,
                HubEvent::Shutdown(done) => {
                    let closed = self.shutdown().await;
                    let _ = done.send(closed);
                    return;
                }
            }
        }

        tracing::debug!("All hub handles dropped, draining registry");
        self.shutdown().await;
    }

    async fn register(&mut self, connection: Arc<Connection>) {
        let id = connection.id().to_string();
        if let Some(previous) = self.registry.insert(id.clone(), Arc::clone(&connection)) {
            if !Arc::ptr_eq(&previous, &connection) {
                tracing::info!(connection_id = %id, "Replacing connection with same identity");
                previous.close().await;
            }
        }

        tracing::info!(
            connection_id = %id,
            connections = self.registry.len(),
            "Connection registered"
        );
        self.publish_count();
    }

    async fn unregister(&mut self, connection: Arc<Connection>) {
        let registered = self
            .registry
            .get(connection.id())
            .is_some_and(|current| Arc::ptr_eq(current, &connection));

        if registered {
            self.registry.remove(connection.id());
            connection.close().await;
            tracing::info!(
                connection_id = %connection.id(),
                connections = self.registry.len(),
                "Connection unregistered"
            );
        } else {
            tracing::debug!(
                connection_id = %connection.id(),
                "Unregister for unknown connection ignored"
            );
        }
        self.publish_count();
    }

    /// Write the frame to every registered connection concurrently and wait
    /// for all writes before returning
    async fn broadcast(&mut self, frame: Frame) {
        let kind = frame.kind;
        let frame = Arc::new(frame);
        let limit = self.config.write_timeout;

        let mut writes = JoinSet::new();
        for connection in self.registry.values() {
            let connection = Arc::clone(connection);
            let frame = Arc::clone(&frame);
            writes.spawn(async move {
                let result = connection.send_timeout(&frame, limit).await;
                (connection, result)
            });
        }

        let recipients = writes.len();
        let mut failed = 0usize;
        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((connection, Err(e))) => {
                    failed += 1;
                    tracing::warn!(
                        connection_id = %connection.id(),
                        error = %e,
                        "Broadcast write failed"
                    );
                    self.requeue_unregister(connection);
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(error = %e, "Broadcast write task failed");
                }
            }
        }

        tracing::debug!(frame_kind = %kind, recipients, failed, "Broadcast complete");
    }

    async fn send_to(&mut self, connection: Arc<Connection>, frame: Frame) {
        if let Err(e) = connection
            .send_timeout(&frame, self.config.write_timeout)
            .await
        {
            if connection.is_closed() {
                tracing::debug!(
                    connection_id = %connection.id(),
                    frame_kind = %frame.kind,
                    "Dropped write to closed connection"
                );
            } else {
                tracing::warn!(
                    connection_id = %connection.id(),
                    frame_kind = %frame.kind,
                    error = %e,
                    "Write failed"
                );
            }
            self.requeue_unregister(connection);
        }
    }

    async fn shutdown(&mut self) -> usize {
        self.events.close();

        // Anything still queued is dropped; connections it mentions are
        // closed along with the registry.
        let mut pending = Vec::new();
        let mut stragglers = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            match event {
                HubEvent::Register(connection) => pending.push(connection),
                HubEvent::Unregister(connection) | HubEvent::DirectSend(connection, _) => {
                    stragglers.push(connection)
                }
                HubEvent::Broadcast(_) => {}
                HubEvent::Shutdown(done) => {
                    let _ = done.send(0);
                }
            }
        }

        let mut connections: Vec<Arc<Connection>> =
            self.registry.drain().map(|(_, connection)| connection).collect();
        for connection in pending {
            if !connections.iter().any(|c| Arc::ptr_eq(c, &connection)) {
                connections.push(connection);
            }
        }

        let closed = shutdown::drain_connections(connections, &self.config).await;
        for connection in stragglers {
            connection.close().await;
        }

        self.publish_count();
        closed
    }

    fn requeue_unregister(&self, connection: Arc<Connection>) {
        let Some(events) = self.requeue.upgrade() else {
            return;
        };
        match events.try_send(HubEvent::Unregister(connection)) {
            Ok(()) => {}
            // The router is the only consumer, so it cannot wait for room
            // itself
            Err(TrySendError::Full(event)) => {
                tokio::spawn(async move {
                    let _ = events.send(event).await;
                });
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    fn publish_count(&self) {
        self.count.send_replace(self.registry.len());
    }
}
