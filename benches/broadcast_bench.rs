//! Benchmarks for broadcast fan-out
//!
//! Run with: cargo bench

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use herald::{Connection, Frame, FrameSink, FrameSource, Hub, HubConfig, TransportError};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

/// Reports every completed write
struct CountingSink {
    written: mpsc::UnboundedSender<()>,
}

#[async_trait]
impl FrameSink for CountingSink {
    async fn send(&mut self, _frame: &Frame) -> Result<(), TransportError> {
        let _ = self.written.send(());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// A peer that never sends anything
struct SilentSource;

#[async_trait]
impl FrameSource for SilentSource {
    async fn recv(&mut self) -> Result<Frame, TransportError> {
        std::future::pending().await
    }
}

fn bench_broadcast(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("broadcast");

    for peers in [10, 100, 1000] {
        let (hub, mut written) = rt.block_on(async {
            let hub = Hub::start(HubConfig {
                expected_peers: peers,
                ..Default::default()
            })
            .unwrap();
            let (tx, rx) = mpsc::unbounded_channel();
            let mut readers = Vec::with_capacity(peers);
            for i in 0..peers {
                let sink = CountingSink { written: tx.clone() };
                let (conn, reader) = Connection::new(
                    format!("10.0.{}.{}:9000", i / 256, i % 256),
                    sink,
                    SilentSource,
                    Duration::from_millis(10),
                );
                hub.register(conn).await.unwrap();
                readers.push(reader);
            }
            let mut count = hub.watch_connections();
            count.wait_for(|n| *n == peers).await.unwrap();
            drop(readers);
            (hub, rx)
        });

        group.throughput(Throughput::Elements(peers as u64));
        group.bench_function(format!("fan_out_{}", peers), |b| {
            b.iter(|| {
                rt.block_on(async {
                    hub.broadcast(black_box(Frame::text("benchmark payload")))
                        .await
                        .unwrap();
                    for _ in 0..peers {
                        written.recv().await.unwrap();
                    }
                })
            })
        });

        rt.block_on(hub.shutdown());
    }

    group.finish();
}

criterion_group!(benches, bench_broadcast);
criterion_main!(benches);
