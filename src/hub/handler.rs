//! WebSocket Handler
//!
//! Upgrades HTTP requests on the hub route and hands the resulting socket to
//! the hub. The adapters below are the only place that knows about axum's
//! message type.

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};

use super::frame::{Frame, FrameKind};
use super::router::Hub;
use super::transport::{FrameSink, FrameSource, TransportError};
use crate::api::AppState;

/// WebSocket upgrade handler
///
/// The peer's socket address becomes the connection identity.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let hub = state.hub.clone();
    ws.on_failed_upgrade(move |error| {
        tracing::warn!(peer = %addr, error = %error, "WebSocket upgrade failed");
    })
    .on_upgrade(move |socket| handle_socket(socket, addr, hub))
}

/// Hand an upgraded socket over to the hub
async fn handle_socket(socket: WebSocket, addr: SocketAddr, hub: Hub) {
    let (sender, receiver) = socket.split();

    match hub
        .accept(addr.to_string(), WsSink::new(sender), WsSource::new(receiver))
        .await
    {
        Ok(connection) => {
            tracing::debug!(connection_id = %connection.id(), "WebSocket accepted");
        }
        Err(e) => {
            tracing::debug!(peer = %addr, error = %e, "WebSocket refused");
        }
    }
}

/// Write half of an axum WebSocket
pub struct WsSink {
    inner: SplitSink<WebSocket, Message>,
}

/// Read half of an axum WebSocket
pub struct WsSource {
    inner: SplitStream<WebSocket>,
}

impl WsSink {
    pub fn new(inner: SplitSink<WebSocket, Message>) -> Self {
        Self { inner }
    }
}

impl WsSource {
    pub fn new(inner: SplitStream<WebSocket>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let message = to_message(frame)?;
        self.inner.send(message).await.map_err(io_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inner.close().await.map_err(io_error)
    }
}

#[async_trait]
impl FrameSource for WsSource {
    async fn recv(&mut self) -> Result<Frame, TransportError> {
        match self.inner.next().await {
            Some(Ok(message)) => from_message(message),
            Some(Err(e)) => Err(io_error(e)),
            None => Err(TransportError::closed()),
        }
    }
}

fn io_error(error: axum::Error) -> TransportError {
    TransportError::Io(error.to_string())
}

fn to_message(frame: &Frame) -> Result<Message, TransportError> {
    let message = match frame.kind {
        FrameKind::Text => {
            let text = String::from_utf8(frame.payload.clone())
                .map_err(|e| TransportError::Protocol(format!("text frame is not UTF-8: {e}")))?;
            Message::Text(text)
        }
        FrameKind::Binary => Message::Binary(frame.payload.clone()),
        FrameKind::Ping => Message::Ping(frame.payload.clone()),
        FrameKind::Pong => Message::Pong(frame.payload.clone()),
        FrameKind::Close => Message::Close(frame.close_code().map(|code| CloseFrame {
            code,
            reason: Cow::Owned(frame.close_reason()),
        })),
    };
    Ok(message)
}

/// Convert an inbound message. A close message ends the read side, so it is
/// reported as the terminal `Closed` error carrying the peer's status.
fn from_message(message: Message) -> Result<Frame, TransportError> {
    match message {
        Message::Text(text) => Ok(Frame::text(text)),
        Message::Binary(data) => Ok(Frame::binary(data)),
        Message::Ping(data) => Ok(Frame::ping(data)),
        Message::Pong(data) => Ok(Frame::pong(data)),
        Message::Close(Some(close)) => Err(TransportError::Closed {
            code: Some(close.code),
            reason: close.reason.into_owned(),
        }),
        Message::Close(None) => Err(TransportError::closed()),
    }
}
