//! Transport abstraction traits for Tutorline.
//!
//! These traits define the interface that all transport implementations must
//! provide, allowing connection pumps to be transport-agnostic.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tutorline_protocol::{ClientFrame, ServerFrame};

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let seq = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{timestamp:x}_{seq}"))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] tutorline_protocol::ProtocolError),
}

/// Close code and reason sent with the final close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// The server hit an unexpected condition.
    pub const INTERNAL_ERROR: u16 = 1011;

    /// A normal close without a reason text.
    #[must_use]
    pub fn normal() -> Self {
        Self {
            code: Self::NORMAL,
            reason: String::new(),
        }
    }

    /// An internal-error close carrying a reason.
    #[must_use]
    pub fn internal(reason: impl Into<String>) -> Self {
        Self {
            code: Self::INTERNAL_ERROR,
            reason: reason.into(),
        }
    }
}

/// Something read from the inbound half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A well-formed client frame.
    Frame(ClientFrame),
    /// A payload that could not be decoded; carries the decoder message.
    Malformed(String),
    /// Transport-level keepalive traffic (ping or pong).
    Heartbeat,
}

/// Outbound half of a client link.
///
/// Owned exclusively by a connection's write loop.
#[async_trait]
pub trait FrameSink: Send {
    /// Send a frame to the client.
    async fn send(&mut self, frame: &ServerFrame) -> Result<(), TransportError>;

    /// Send a transport-level ping.
    async fn ping(&mut self) -> Result<(), TransportError>;

    /// Send a close frame and shut the link down.
    ///
    /// Closing an already closed sink is a no-op.
    async fn close(&mut self, reason: Option<CloseReason>) -> Result<(), TransportError>;
}

/// Inbound half of a client link.
///
/// Owned exclusively by a connection's read loop.
#[async_trait]
pub trait FrameStream: Send {
    /// Receive the next item from the client.
    ///
    /// Returns `None` if the connection is closed cleanly.
    async fn recv(&mut self) -> Result<Option<Incoming>, TransportError>;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }
}
