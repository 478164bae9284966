//! Connection Handle
//!
//! Wraps one peer's framed channel. All writers (broadcast fan-out, the
//! keepalive pinger, direct sends, the shutdown close frame) go through a
//! single async mutex, so frames never interleave on the wire. Reading is
//! done through a separate [`ConnectionReader`] owned by the connection's
//! read task.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::frame::Frame;
use super::transport::{FrameSink, FrameSource, TransportError};

/// Identity of a connection (the peer's remote address)
pub type ConnectionId = String;

/// Shared write side of a peer connection
pub struct Connection {
    id: ConnectionId,
    sink: Mutex<Box<dyn FrameSink>>,
    closed: AtomicBool,
    /// Cancelled on close; aborts in-flight writes and the pending read
    shutdown: CancellationToken,
    /// Bound on shutting the write half down
    close_timeout: Duration,
}

/// Exclusive read side of a peer connection
pub struct ConnectionReader {
    id: ConnectionId,
    source: Box<dyn FrameSource>,
    shutdown: CancellationToken,
}

impl Connection {
    /// Wrap a framed channel, returning the shared handle and its reader
    pub fn new<S, R>(
        id: impl Into<ConnectionId>,
        sink: S,
        source: R,
        close_timeout: Duration,
    ) -> (Arc<Connection>, ConnectionReader)
    where
        S: FrameSink,
        R: FrameSource,
    {
        let id = id.into();
        let shutdown = CancellationToken::new();

        let connection = Arc::new(Connection {
            id: id.clone(),
            sink: Mutex::new(Box::new(sink)),
            closed: AtomicBool::new(false),
            shutdown: shutdown.clone(),
            close_timeout,
        });
        let reader = ConnectionReader {
            id,
            source: Box::new(source),
            shutdown,
        };

        (connection, reader)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Write one frame, waiting for any concurrent writer to finish first
    pub async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::closed());
        }

        let mut sink = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(TransportError::closed()),
            guard = self.sink.lock() => guard,
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(TransportError::closed()),
            result = sink.send(frame) => result,
        }
    }

    /// Write one frame, giving up after `limit` (queueing behind other
    /// writers counts against the limit)
    pub async fn send_timeout(
        &self,
        frame: &Frame,
        limit: Option<Duration>,
    ) -> Result<(), TransportError> {
        match limit {
            Some(limit) => match tokio::time::timeout(limit, self.send(frame)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::TimedOut),
            },
            None => self.send(frame).await,
        }
    }

    /// Close the channel. Only the first call does anything; it returns
    /// `true` for that call.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.shutdown.cancel();

        let closing = async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        };
        match tokio::time::timeout(self.close_timeout, closing).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %self.id, error = %e, "Error closing transport");
            }
            Err(_) => {
                tracing::debug!(connection_id = %self.id, "Timed out closing transport");
            }
        }
        true
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ConnectionReader {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Read the next frame. Returns a `Closed` error as soon as the
    /// connection is closed locally.
    pub async fn recv(&mut self) -> Result<Frame, TransportError> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(TransportError::closed()),
            frame = self.source.recv() => frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::frame::FrameKind;
    use crate::hub::mock::mock_channel;
    use std::sync::atomic::Ordering;

    fn connection(name: &str) -> (Arc<Connection>, ConnectionReader, crate::hub::mock::MockPeer) {
        let (sink, source, peer) = mock_channel(name);
        let (conn, reader) = Connection::new(name, sink, source, Duration::from_millis(50));
        (conn, reader, peer)
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let (conn, mut reader, mut peer) = connection("127.0.0.1:5000");
        assert_eq!(conn.id(), "127.0.0.1:5000");
        assert_eq!(reader.id(), "127.0.0.1:5000");

        conn.send(&Frame::text("hello")).await.unwrap();
        assert_eq!(peer.next_sent().await, Some(Frame::text("hello")));

        peer.send(Frame::binary(vec![1, 2, 3]));
        let frame = reader.recv().await.unwrap();
        assert_eq!(frame.kind, FrameKind::Binary);
        assert_eq!(frame.payload, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (conn, _reader, peer) = connection("c1");

        assert!(conn.close().await);
        assert!(!conn.close().await);
        assert!(conn.is_closed());
        assert_eq!(peer.close_calls(), 1);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (conn, _reader, _peer) = connection("c1");
        conn.close().await;

        let result = conn.send(&Frame::text("late")).await;
        assert!(matches!(result, Err(TransportError::Closed { .. })));
    }

    #[tokio::test]
    async fn test_close_unblocks_reader() {
        let (conn, mut reader, _peer) = connection("c1");

        let read = tokio::spawn(async move { reader.recv().await });
        conn.close().await;

        let result = read.await.unwrap();
        assert!(matches!(result, Err(TransportError::Closed { .. })));
    }

    #[tokio::test]
    async fn test_write_failure_reported() {
        let (conn, _reader, peer) = connection("c1");
        peer.state.fail_writes.store(true, Ordering::SeqCst);

        let result = conn.send(&Frame::text("x")).await;
        assert!(matches!(result, Err(TransportError::Io(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout_on_stalled_peer() {
        let (conn, _reader, peer) = connection("c1");
        peer.state.stall_writes.store(true, Ordering::SeqCst);

        let result = conn
            .send_timeout(&Frame::text("x"), Some(Duration::from_secs(1)))
            .await;
        assert_eq!(result, Err(TransportError::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_aborts_stalled_writer() {
        let (conn, _reader, peer) = connection("c1");
        peer.state.stall_writes.store(true, Ordering::SeqCst);

        let writer = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.send(&Frame::text("stuck")).await })
        };
        tokio::task::yield_now().await;

        assert!(conn.close().await);
        let result = writer.await.unwrap();
        assert!(matches!(result, Err(TransportError::Closed { .. })));
        assert_eq!(peer.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_writes_do_not_interleave() {
        let journal = Arc::new(std::sync::Mutex::new(Vec::new()));
        let (sink, source, peer) =
            crate::hub::mock::mock_channel_with_journal("c1", Arc::clone(&journal));
        peer.state.set_write_delay(Duration::from_millis(20));
        let (conn, _reader) = Connection::new("c1", sink, source, Duration::from_millis(50));

        let a = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.send(&Frame::text("a")).await })
        };
        let b = {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.send(&Frame::ping(b"b".to_vec())).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let entries = journal.lock().unwrap().clone();
        assert_eq!(entries.len(), 4);
        // Each start is immediately followed by its own end
        assert_eq!(entries[0].replace("start", "end"), entries[1]);
        assert_eq!(entries[2].replace("start", "end"), entries[3]);
    }
}
