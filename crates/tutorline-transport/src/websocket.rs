//! WebSocket transport implementation.
//!
//! Wraps an axum-upgraded [`WebSocket`] and splits it into a [`WsSink`] and
//! a [`WsStream`] so the two halves can be driven by separate tasks.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};
use tutorline_protocol::{codec, ServerFrame};

use crate::traits::{CloseReason, FrameSink, FrameStream, Incoming, TransportError};

/// Split an upgraded socket into its outbound and inbound halves.
#[must_use]
pub fn split(
    socket: WebSocket,
    max_message_size: usize,
    remote_addr: Option<String>,
) -> (WsSink, WsStream) {
    let (sink, stream) = socket.split();
    (
        WsSink {
            inner: sink,
            closed: false,
        },
        WsStream {
            inner: stream,
            max_message_size,
            remote_addr,
        },
    )
}

/// Outbound half of a WebSocket.
pub struct WsSink {
    inner: SplitSink<WebSocket, Message>,
    closed: bool,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: &ServerFrame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }

        let text = codec::encode(frame)?;
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }

        self.inner
            .send(Message::Ping(Vec::new()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self, reason: Option<CloseReason>) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let frame = reason.map(|r| CloseFrame {
            code: r.code,
            reason: r.reason.into(),
        });

        let sent = self.inner.send(Message::Close(frame)).await;
        let closed = self.inner.close().await;

        sent.and(closed)
            .map_err(|e| TransportError::SendFailed(format!("Failed to close: {}", e)))
    }
}

/// Inbound half of a WebSocket.
pub struct WsStream {
    inner: SplitStream<WebSocket>,
    max_message_size: usize,
    remote_addr: Option<String>,
}

impl WsStream {
    fn decode(&self, text: &str) -> Result<Incoming, TransportError> {
        match codec::decode_with_limit(text, self.max_message_size) {
            Ok(frame) => Ok(Incoming::Frame(frame)),
            Err(e @ tutorline_protocol::ProtocolError::FrameTooLarge(_)) => {
                warn!(
                    size = text.len(),
                    max = self.max_message_size,
                    "Message too large"
                );
                Err(TransportError::Protocol(e))
            }
            Err(e) => Ok(Incoming::Malformed(e.to_string())),
        }
    }
}

#[async_trait]
impl FrameStream for WsStream {
    async fn recv(&mut self) -> Result<Option<Incoming>, TransportError> {
        match self.inner.next().await {
            Some(Ok(Message::Text(text))) => self.decode(&text).map(Some),
            Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                // For compatibility, accept JSON sent in binary frames
                Ok(text) => self.decode(text).map(Some),
                Err(_) => Ok(Some(Incoming::Malformed(
                    "binary payload is not UTF-8".to_string(),
                ))),
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(Some(Incoming::Heartbeat)),
            Some(Ok(Message::Close(frame))) => {
                debug!(reason = ?frame, "Received close frame");
                Ok(None)
            }
            Some(Err(e)) => Err(TransportError::ReceiveFailed(e.to_string())),
            None => {
                debug!("WebSocket stream ended");
                Ok(None)
            }
        }
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.clone()
    }
}
