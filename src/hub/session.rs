//! Per-connection session
//!
//! One session runs for every accepted connection: it registers the
//! connection, reads until the first failure while a pinger keeps the peer
//! busy, and unregisters on the way out. Every path out of the read loop
//! ends in exactly one unregistration.
//!
//! Once the hub stops taking events the session keeps reading and drops
//! what it reads. The drain owns the connection from then on: it sends the
//! close frame and closes the channel, which ends the read.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::connection::{Connection, ConnectionReader};
use super::frame::{Frame, FrameKind};
use super::liveness::{self, Liveness};
use super::router::Hub;
use super::transport::TransportError;

pub(crate) async fn run(hub: Hub, connection: Arc<Connection>, mut reader: ConnectionReader) {
    if hub.register(Arc::clone(&connection)).await.is_err() {
        connection.close().await;
        return;
    }

    let stop = CancellationToken::new();
    let pinger = tokio::spawn(liveness::run_pinger(
        hub.clone(),
        Arc::clone(&connection),
        hub.config().ping_interval,
        stop.clone(),
    ));

    read_loop(&hub, &connection, &mut reader).await;

    stop.cancel();
    if let Err(e) = pinger.await {
        tracing::warn!(connection_id = %connection.id(), error = %e, "Pinger task failed");
    }

    if hub.unregister(Arc::clone(&connection)).await.is_err() {
        // Reading has failed, so there is nothing left for the drain to say
        connection.close().await;
    }
}

async fn read_loop(hub: &Hub, connection: &Arc<Connection>, reader: &mut ConnectionReader) {
    let mut liveness = Liveness::new(hub.config().ping_timeout);

    loop {
        let frame = match liveness.read(reader).await {
            Ok(frame) => frame,
            Err(TransportError::TimedOut) => {
                tracing::warn!(connection_id = %connection.id(), "Liveness deadline exceeded");
                return;
            }
            Err(e) if e.is_expected_closure() => {
                tracing::debug!(connection_id = %connection.id(), reason = %e, "Connection closed");
                return;
            }
            Err(e) => {
                tracing::warn!(connection_id = %connection.id(), error = %e, "Read failed");
                return;
            }
        };

        let queued = match frame.kind {
            FrameKind::Ping => {
                liveness.extend();
                hub.send_to(connection, Frame::pong(frame.payload)).await
            }
            FrameKind::Pong => {
                liveness.extend();
                Ok(())
            }
            FrameKind::Close => {
                tracing::debug!(
                    connection_id = %connection.id(),
                    code = ?frame.close_code(),
                    "Peer sent close frame"
                );
                return;
            }
            FrameKind::Text | FrameKind::Binary => {
                liveness.extend();
                tracing::debug!(
                    connection_id = %connection.id(),
                    frame_kind = %frame.kind,
                    bytes = frame.len(),
                    "Message received"
                );
                hub.broadcast(frame).await
            }
        };

        if queued.is_err() {
            tracing::debug!(
                connection_id = %connection.id(),
                "Hub shutting down, frame dropped"
            );
        }
    }
}
