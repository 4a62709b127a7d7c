//! Frame types for the Tutorline protocol.
//!
//! Frames are the fundamental unit of communication between a client and the
//! hub. Each frame is a JSON object tagged by its `"type"` field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, Role, RoomId, UserId};

/// A persisted chat message as routed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Identifier assigned by the message store.
    pub id: MessageId,
    /// Room the message belongs to.
    pub room_id: RoomId,
    /// Author of the message.
    pub sender_id: UserId,
    /// Message body.
    pub content: String,
    /// When the hub accepted the message.
    pub created_at: DateTime<Utc>,
}

/// Machine-readable error codes carried by [`ServerFrame::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The inbound frame could not be decoded.
    BadFrame,
    /// A direct send without a room.
    MissingRoom,
    /// A counterpart send without a target user.
    MissingTarget,
    /// A counterpart send addressed to the sender.
    SelfTarget,
    /// Message body is empty.
    EmptyContent,
    /// Message body exceeds the configured limit.
    ContentTooLong,
    /// The sender's role cannot post messages.
    ReadOnly,
    /// The sender is not a member of the addressed room.
    NotMember,
    /// Server-side failure.
    Internal,
}

impl ErrorCode {
    /// Snake-case name as it appears on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadFrame => "bad_frame",
            ErrorCode::MissingRoom => "missing_room",
            ErrorCode::MissingTarget => "missing_target",
            ErrorCode::SelfTarget => "self_target",
            ErrorCode::EmptyContent => "empty_content",
            ErrorCode::ContentTooLong => "content_too_long",
            ErrorCode::ReadOnly => "read_only",
            ErrorCode::NotMember => "not_member",
            ErrorCode::Internal => "internal",
        }
    }
}

/// Frames sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Post a message, either into a room or to a counterpart user.
    #[serde(rename = "send")]
    Send {
        /// Target room (teacher path).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
        /// Counterpart user (student path).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_user_id: Option<UserId>,
        /// Message body.
        content: String,
    },

    /// Application-level keepalive.
    #[serde(rename = "ping")]
    Ping {
        /// Optional timestamp echoed back in the pong.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl ClientFrame {
    /// Create a send frame addressed to a room.
    #[must_use]
    pub fn send_to_room(room_id: RoomId, content: impl Into<String>) -> Self {
        ClientFrame::Send {
            room_id: Some(room_id),
            target_user_id: None,
            content: content.into(),
        }
    }

    /// Create a send frame addressed to a counterpart user.
    #[must_use]
    pub fn send_to_user(target_user_id: UserId, content: impl Into<String>) -> Self {
        ClientFrame::Send {
            room_id: None,
            target_user_id: Some(target_user_id),
            content: content.into(),
        }
    }
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    /// Sent once, right after the connection is registered.
    #[serde(rename = "connected")]
    Connected {
        /// Unique connection identifier.
        connection_id: String,
        /// Authenticated user.
        user_id: UserId,
        /// Role of the authenticated user.
        role: Role,
        /// Rooms this connection receives broadcasts for.
        rooms: Vec<RoomId>,
        /// Protocol version spoken by the server.
        version: String,
        /// Interval at which the server pings, in milliseconds.
        heartbeat_ms: u64,
    },

    /// A chat message broadcast to a room.
    #[serde(rename = "message")]
    Message(ChatMessage),

    /// Request-level failure; the connection stays open.
    #[serde(rename = "error")]
    Error {
        /// Error code.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
    },

    /// Reply to a client ping.
    #[serde(rename = "pong")]
    Pong {
        /// Echoed timestamp from the ping.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl ServerFrame {
    /// Create a new Error frame.
    #[must_use]
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            code,
            message: message.into(),
        }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        ServerFrame::Pong { timestamp }
    }
}

impl From<ChatMessage> for ServerFrame {
    fn from(message: ChatMessage) -> Self {
        ServerFrame::Message(message)
    }
}
