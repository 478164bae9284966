//! In-memory transport for hub tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::frame::{Frame, FrameKind, CLOSE_GOING_AWAY};
use super::router::Hub;
use super::transport::{FrameSink, FrameSource, TransportError};

type Inbound = Result<Frame, TransportError>;

/// Shared write log across several mock peers
pub(crate) type Journal = Arc<Mutex<Vec<String>>>;

/// Knobs and counters shared between a mock sink and the test
#[derive(Default)]
pub(crate) struct MockState {
    pub close_calls: AtomicUsize,
    pub fail_writes: AtomicBool,
    pub stall_writes: AtomicBool,
    pub answer_pings: AtomicBool,
    pub ignore_close: AtomicBool,
    write_delay_ms: AtomicU64,
}

impl MockState {
    pub fn set_write_delay(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

/// The test's view of the remote end
pub(crate) struct MockPeer {
    /// Frames the hub wrote to this peer
    pub sent: mpsc::UnboundedReceiver<Frame>,
    /// Frames (or a terminal error) the peer sends to the hub
    pub inbound: mpsc::UnboundedSender<Inbound>,
    pub state: Arc<MockState>,
}

impl MockPeer {
    pub fn send(&self, frame: Frame) {
        let _ = self.inbound.send(Ok(frame));
    }

    pub fn hang_up(&self) {
        let _ = self.inbound.send(Err(TransportError::closed()));
    }

    pub fn close_calls(&self) -> usize {
        self.state.close_calls.load(Ordering::SeqCst)
    }

    /// Drain everything written so far
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.sent.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Next frame written by the hub, waiting up to five seconds
    pub async fn next_sent(&mut self) -> Option<Frame> {
        tokio::time::timeout(Duration::from_secs(5), self.sent.recv())
            .await
            .ok()
            .flatten()
    }
}

pub(crate) struct MockSink {
    name: String,
    state: Arc<MockState>,
    outbox: mpsc::UnboundedSender<Frame>,
    inbound: mpsc::UnboundedSender<Inbound>,
    journal: Option<Journal>,
}

pub(crate) struct MockSource {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

pub(crate) fn mock_channel(name: &str) -> (MockSink, MockSource, MockPeer) {
    build(name, None)
}

pub(crate) fn mock_channel_with_journal(
    name: &str,
    journal: Journal,
) -> (MockSink, MockSource, MockPeer) {
    build(name, Some(journal))
}

fn build(name: &str, journal: Option<Journal>) -> (MockSink, MockSource, MockPeer) {
    let (outbox, sent) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let state = Arc::new(MockState::default());

    let sink = MockSink {
        name: name.to_string(),
        state: Arc::clone(&state),
        outbox,
        inbound: inbound_tx.clone(),
        journal,
    };
    let source = MockSource { inbound: inbound_rx };
    let peer = MockPeer {
        sent,
        inbound: inbound_tx,
        state,
    };
    (sink, source, peer)
}

impl MockSink {
    fn record(&self, phase: &str, frame: &Frame) {
        if let Some(journal) = &self.journal {
            let payload = String::from_utf8_lossy(&frame.payload);
            journal
                .lock()
                .unwrap()
                .push(format!("{phase}:{}:{payload}", self.name));
        }
    }
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        if self.state.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Io("broken pipe".to_string()));
        }

        self.record("start", frame);
        let delay = self.state.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.record("end", frame);

        let _ = self.outbox.send(frame.clone());

        match frame.kind {
            FrameKind::Ping if self.state.answer_pings.load(Ordering::SeqCst) => {
                let _ = self.inbound.send(Ok(Frame::pong(frame.payload.clone())));
            }
            FrameKind::Close if !self.state.ignore_close.load(Ordering::SeqCst) => {
                let _ = self.inbound.send(Err(TransportError::Closed {
                    code: Some(CLOSE_GOING_AWAY),
                    reason: "Bye".to_string(),
                }));
            }
            _ => {}
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl FrameSource for MockSource {
    async fn recv(&mut self) -> Result<Frame, TransportError> {
        match self.inbound.recv().await {
            Some(item) => item,
            None => Err(TransportError::closed()),
        }
    }
}

/// Wait until the hub reports `expected` registered connections
pub(crate) async fn wait_count(hub: &Hub, expected: usize) {
    let mut count = hub.watch_connections();
    tokio::time::timeout(Duration::from_secs(5), count.wait_for(|n| *n == expected))
        .await
        .expect("registry size not reached")
        .unwrap();
}
