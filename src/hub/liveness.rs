//! Liveness Supervisor
//!
//! Two halves per connection:
//!
//! - [`Liveness`] is the read deadline. The read task reads through it and
//!   extends it on every inbound frame; once it lapses the read fails with
//!   [`TransportError::TimedOut`] and the connection is unregistered like
//!   after any other read failure.
//! - [`run_pinger`] queues a ping for the connection every ping interval.
//!   Pings go through the router as direct sends, so they are serialized
//!   with broadcast writes on the connection's write path.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::connection::{Connection, ConnectionReader};
use super::frame::Frame;
use super::router::Hub;
use super::transport::TransportError;

/// Liveness state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    /// The deadline is in the future
    Alive,
    /// The deadline passed without activity; the connection never recovers
    Expired,
}

/// Read deadline of one connection
#[derive(Debug)]
pub struct Liveness {
    timeout: Duration,
    deadline: Instant,
}

impl Liveness {
    /// Start tracking with the deadline one `timeout` from now
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    /// Push the deadline one `timeout` past the current instant
    pub fn extend(&mut self) {
        self.deadline = Instant::now() + self.timeout;
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn state(&self) -> LivenessState {
        if Instant::now() >= self.deadline {
            LivenessState::Expired
        } else {
            LivenessState::Alive
        }
    }

    pub fn is_expired(&self) -> bool {
        self.state() == LivenessState::Expired
    }

    /// Read the next frame, failing with `TimedOut` once the deadline passes
    pub async fn read(&self, reader: &mut ConnectionReader) -> Result<Frame, TransportError> {
        match tokio::time::timeout_at(self.deadline, reader.recv()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::TimedOut),
        }
    }
}

/// Queue a ping for `connection` every `interval` until `stop` fires or the
/// hub stops taking events. The first ping goes out one interval after start.
pub(crate) async fn run_pinger(
    hub: Hub,
    connection: Arc<Connection>,
    interval: Duration,
    stop: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let queued = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            result = hub.send_to(&connection, Frame::ping(Vec::new())) => result,
        };
        if queued.is_err() {
            break;
        }
        tracing::trace!(connection_id = %connection.id(), "Ping queued");
    }

    tracing::debug!(connection_id = %connection.id(), "Pinger stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::config::HubConfig;
    use crate::hub::frame::FrameKind;
    use crate::hub::mock::{mock_channel, wait_count};
    use std::sync::atomic::Ordering;

    fn hub() -> Hub {
        Hub::start(HubConfig {
            ping_interval: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(10),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_extends_from_now() {
        let mut liveness = Liveness::new(Duration::from_secs(10));
        let start = liveness.deadline();
        assert_eq!(liveness.state(), LivenessState::Alive);

        tokio::time::sleep(Duration::from_secs(4)).await;
        liveness.extend();
        assert_eq!(liveness.deadline(), start + Duration::from_secs(4));

        tokio::time::sleep(Duration::from_secs(14)).await;
        assert!(liveness.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_times_out_at_deadline() {
        let (sink, source, _peer) = mock_channel("c1");
        let (_conn, mut reader) = Connection::new("c1", sink, source, Duration::from_millis(50));
        let liveness = Liveness::new(Duration::from_secs(3));

        let started = Instant::now();
        let result = liveness.read(&mut reader).await;
        assert_eq!(result, Err(TransportError::TimedOut));
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_is_evicted_after_timeout() {
        let hub = hub();
        let (sink, source, mut peer) = mock_channel("silent");
        let conn = hub.accept("silent", sink, source).await.unwrap();
        wait_count(&hub, 1).await;

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(hub.connection_count(), 1);
        assert!(!conn.is_closed());

        tokio::time::sleep(Duration::from_secs(2)).await;
        wait_count(&hub, 0).await;
        assert!(conn.is_closed());
        assert_eq!(peer.close_calls(), 1);

        // Pings went out but were never answered
        let sent = peer.drain();
        assert!(sent.iter().any(|f| f.kind == FrameKind::Ping));
    }

    #[tokio::test(start_paused = true)]
    async fn test_responsive_peer_is_never_evicted() {
        let hub = hub();
        let (sink, source, mut peer) = mock_channel("chatty");
        peer.state.answer_pings.store(true, Ordering::SeqCst);
        let conn = hub.accept("chatty", sink, source).await.unwrap();
        wait_count(&hub, 1).await;

        tokio::time::sleep(Duration::from_secs(5) * 2000).await;

        assert_eq!(hub.connection_count(), 1);
        assert!(!conn.is_closed());
        let pings = peer.drain().iter().filter(|f| f.kind == FrameKind::Ping).count();
        assert!(pings >= 1900, "only {pings} pings sent");
    }

    #[tokio::test]
    async fn test_peer_ping_answered_with_pong() {
        let hub = hub();
        let (sink, source, mut peer) = mock_channel("c1");
        hub.accept("c1", sink, source).await.unwrap();
        wait_count(&hub, 1).await;

        peer.send(Frame::ping(b"abc".to_vec()));
        assert_eq!(peer.next_sent().await, Some(Frame::pong(b"abc".to_vec())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_data_frames_extend_deadline() {
        let hub = hub();
        let (sink, source, peer) = mock_channel("talker");
        let conn = hub.accept("talker", sink, source).await.unwrap();
        wait_count(&hub, 1).await;

        // Never answers pings, but keeps talking for twice the timeout
        for i in 0..5 {
            tokio::time::sleep(Duration::from_secs(4)).await;
            peer.send(Frame::text(format!("message {i}")));
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(hub.connection_count(), 1);
        assert!(!conn.is_closed());

        tokio::time::sleep(Duration::from_secs(10)).await;
        wait_count(&hub, 0).await;
        assert!(conn.is_closed());
    }
}
