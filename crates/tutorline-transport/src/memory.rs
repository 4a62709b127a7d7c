//! In-process transport.
//!
//! [`pair`] returns the two server-side halves plus a [`MemoryClient`] that
//! plays the remote peer. Used to drive connection pumps without sockets.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tutorline_protocol::{codec, ClientFrame, ServerFrame};

use crate::traits::{CloseReason, FrameSink, FrameStream, Incoming, TransportError};

/// Everything the server half can emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Frame(ServerFrame),
    Ping,
    Close(Option<CloseReason>),
}

type Inbound = Result<Incoming, TransportError>;

/// Create a connected memory transport.
#[must_use]
pub fn pair() -> (MemorySink, MemoryStream, MemoryClient) {
    let (to_server, from_client) = mpsc::unbounded_channel();
    let (to_client, from_server) = mpsc::unbounded_channel();

    (
        MemorySink {
            tx: to_client,
            closed: false,
        },
        MemoryStream { rx: from_client },
        MemoryClient {
            tx: Some(to_server),
            rx: from_server,
        },
    )
}

/// Server-side outbound half.
pub struct MemorySink {
    tx: mpsc::UnboundedSender<Outgoing>,
    closed: bool,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: &ServerFrame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.tx
            .send(Outgoing::Frame(frame.clone()))
            .map_err(|_| TransportError::SendFailed("peer dropped".to_string()))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.tx
            .send(Outgoing::Ping)
            .map_err(|_| TransportError::SendFailed("peer dropped".to_string()))
    }

    async fn close(&mut self, reason: Option<CloseReason>) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // The peer may already be gone; closing still succeeds locally.
        let _ = self.tx.send(Outgoing::Close(reason));
        Ok(())
    }
}

/// Server-side inbound half.
pub struct MemoryStream {
    rx: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl FrameStream for MemoryStream {
    async fn recv(&mut self) -> Result<Option<Incoming>, TransportError> {
        match self.rx.recv().await {
            Some(Ok(incoming)) => Ok(Some(incoming)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }
}

/// The remote peer of a memory transport.
pub struct MemoryClient {
    tx: Option<mpsc::UnboundedSender<Inbound>>,
    rx: mpsc::UnboundedReceiver<Outgoing>,
}

impl MemoryClient {
    /// Send a client frame.
    pub fn send(&self, frame: ClientFrame) {
        self.push(Ok(Incoming::Frame(frame)));
    }

    /// Send raw text, decoded the same way the WebSocket transport does.
    pub fn send_text(&self, text: &str) {
        let incoming = match codec::decode(text) {
            Ok(frame) => Ok(Incoming::Frame(frame)),
            Err(tutorline_protocol::ProtocolError::FrameTooLarge(n)) => Err(
                TransportError::Protocol(tutorline_protocol::ProtocolError::FrameTooLarge(n)),
            ),
            Err(e) => Ok(Incoming::Malformed(e.to_string())),
        };
        self.push(incoming);
    }

    /// Send keepalive traffic.
    pub fn heartbeat(&self) {
        self.push(Ok(Incoming::Heartbeat));
    }

    /// Make the server's next read fail.
    pub fn fail(&self, reason: &str) {
        self.push(Err(TransportError::ReceiveFailed(reason.to_string())));
    }

    /// Hang up: the server's reads end cleanly once queued items are drained.
    pub fn disconnect(&mut self) {
        self.tx = None;
    }

    /// Stop reading server output; the server's next write fails.
    pub fn stop_reading(&mut self) {
        self.rx.close();
    }

    /// Receive the next thing the server emitted.
    pub async fn recv(&mut self) -> Option<Outgoing> {
        self.rx.recv().await
    }

    /// Receive the next server frame, skipping pings.
    ///
    /// Returns `None` once the server closed or dropped the link.
    pub async fn next_frame(&mut self) -> Option<ServerFrame> {
        loop {
            match self.rx.recv().await? {
                Outgoing::Frame(frame) => return Some(frame),
                Outgoing::Ping => continue,
                Outgoing::Close(_) => return None,
            }
        }
    }

    /// Non-blocking variant of [`MemoryClient::recv`].
    pub fn try_recv(&mut self) -> Option<Outgoing> {
        self.rx.try_recv().ok()
    }

    fn push(&self, item: Inbound) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutorline_protocol::{ErrorCode, RoomId};

    #[tokio::test]
    async fn test_memory_roundtrip() {
        let (mut sink, mut stream, mut client) = pair();

        client.send(ClientFrame::send_to_room(RoomId(7), "hi"));
        assert_eq!(
            stream.recv().await.unwrap(),
            Some(Incoming::Frame(ClientFrame::send_to_room(RoomId(7), "hi")))
        );

        let frame = ServerFrame::error(ErrorCode::BadFrame, "bad");
        sink.send(&frame).await.unwrap();
        assert_eq!(client.next_frame().await, Some(frame));
    }

    #[tokio::test]
    async fn test_memory_malformed_text() {
        let (_sink, mut stream, client) = pair();

        client.send_text("{not json");
        assert!(matches!(
            stream.recv().await.unwrap(),
            Some(Incoming::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_close_once() {
        let (mut sink, _stream, mut client) = pair();

        sink.close(Some(CloseReason::normal())).await.unwrap();
        sink.close(None).await.unwrap();
        assert!(sink.send(&ServerFrame::pong(None)).await.is_err());

        assert_eq!(
            client.recv().await,
            Some(Outgoing::Close(Some(CloseReason::normal())))
        );
        assert_eq!(client.try_recv(), None);
    }

    #[tokio::test]
    async fn test_memory_disconnect_ends_stream() {
        let (_sink, mut stream, mut client) = pair();

        client.heartbeat();
        client.disconnect();
        assert_eq!(stream.recv().await.unwrap(), Some(Incoming::Heartbeat));
        assert_eq!(stream.recv().await.unwrap(), None);
    }
}
