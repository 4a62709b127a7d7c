//! Persistence contracts consumed by the hub's connection pumps.
//!
//! The hub never talks to a database directly; read loops go through these
//! traits so that any backend (PostgreSQL, in-memory) can be plugged in.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tutorline_protocol::{ChatMessage, MessageId, RoomId, UserId};

use crate::message::Draft;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The record conflicts with an existing one.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The backend failed or is unavailable.
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// A chat room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub participants: Vec<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    #[must_use]
    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }
}

/// Message persistence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message and return its identifier.
    async fn save_message(&self, draft: &Draft) -> Result<MessageId, StoreError>;

    /// A page of a room's history.
    ///
    /// `offset` counts back from the newest message; the returned page is
    /// ordered oldest first.
    async fn messages_page(
        &self,
        room_id: RoomId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChatMessage>, StoreError>;

    /// Whether `user_id` participates in `room_id`.
    async fn is_member(&self, room_id: RoomId, user_id: UserId) -> Result<bool, StoreError>;
}

/// Room and membership persistence.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Rooms the user participates in.
    async fn rooms_for_user(&self, user_id: UserId) -> Result<Vec<RoomId>, StoreError>;

    /// A room that has both users as participants, if any.
    async fn room_by_participants(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Room>, StoreError>;

    /// Create a room with the given participants.
    async fn create_room(&self, participants: &[UserId]) -> Result<Room, StoreError>;

    /// Look a room up by id.
    async fn room(&self, room_id: RoomId) -> Result<Option<Room>, StoreError>;

    /// Delete a room with its members and history.
    ///
    /// Returns `false` if there was no such room.
    async fn delete_room(&self, room_id: RoomId) -> Result<bool, StoreError>;
}
