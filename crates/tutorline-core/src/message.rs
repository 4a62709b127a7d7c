//! Messages on their way into the store.
//!
//! A [`Draft`] is what a read loop holds between routing and persistence.
//! Once the store hands back an identifier it becomes a routed
//! [`ChatMessage`].

use chrono::{DateTime, Utc};
use tutorline_protocol::{ChatMessage, MessageId, RoomId, UserId};

/// A message that has been routed to a room but not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    /// Resolved room.
    pub room_id: RoomId,
    /// Author.
    pub sender_id: UserId,
    /// Message body.
    pub content: String,
    /// Time the hub accepted the message.
    pub created_at: DateTime<Utc>,
}

impl Draft {
    /// Create a draft stamped with the current time.
    #[must_use]
    pub fn new(room_id: RoomId, sender_id: UserId, content: impl Into<String>) -> Self {
        Self {
            room_id,
            sender_id,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Attach the store-assigned identifier.
    #[must_use]
    pub fn persisted(self, id: MessageId) -> ChatMessage {
        ChatMessage {
            id,
            room_id: self.room_id,
            sender_id: self.sender_id,
            content: self.content,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_persisted_keeps_fields() {
        let draft = Draft::new(RoomId(7), UserId(3), "hello");
        let created_at = draft.created_at;

        let message = draft.persisted(MessageId(11));
        assert_eq!(message.id, MessageId(11));
        assert_eq!(message.room_id, RoomId(7));
        assert_eq!(message.sender_id, UserId(3));
        assert_eq!(message.content, "hello");
        assert_eq!(message.created_at, created_at);
    }
}
