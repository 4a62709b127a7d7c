//! In-memory implementation of the store contracts.
//!
//! Backs the `memory` storage mode of the server and every test that needs
//! a store. Writes can be switched off to exercise persistence failures.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::debug;
use tutorline_protocol::{ChatMessage, MessageId, RoomId, UserId};

use crate::message::Draft;
use crate::store::{MessageStore, Room, RoomStore, StoreError};

#[derive(Debug, Default)]
struct Inner {
    rooms: BTreeMap<RoomId, Room>,
    messages: Vec<ChatMessage>,
    next_room_id: i64,
    next_message_id: i64,
}

/// Message and room store held in process memory.
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    writable: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            writable: AtomicBool::new(true),
        }
    }

    /// Allow or refuse writes. Refused writes fail with [`StoreError::Backend`].
    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    /// Create a room with an explicit name.
    ///
    /// # Errors
    ///
    /// Returns an error if writes are disabled.
    pub async fn create_named_room(
        &self,
        name: impl Into<String>,
        participants: &[UserId],
    ) -> Result<Room, StoreError> {
        self.check_writable()?;

        let mut inner = self.inner.lock().await;
        inner.next_room_id += 1;
        let mut members = participants.to_vec();
        members.sort();
        members.dedup();

        let room = Room {
            id: RoomId(inner.next_room_id),
            name: name.into(),
            participants: members,
            created_at: Utc::now(),
        };
        inner.rooms.insert(room.id, room.clone());
        debug!(room = %room.id, participants = ?room.participants, "Created room");
        Ok(room)
    }

    /// Number of stored messages.
    pub async fn message_count(&self) -> usize {
        self.inner.lock().await.messages.len()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.writable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Backend("memory store is read-only".to_string()))
        }
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn save_message(&self, draft: &Draft) -> Result<MessageId, StoreError> {
        self.check_writable()?;

        let mut inner = self.inner.lock().await;
        if !inner.rooms.contains_key(&draft.room_id) {
            return Err(StoreError::NotFound(format!("room {}", draft.room_id)));
        }

        inner.next_message_id += 1;
        let id = MessageId(inner.next_message_id);
        inner.messages.push(draft.clone().persisted(id));
        Ok(id)
    }

    async fn messages_page(
        &self,
        room_id: RoomId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let inner = self.inner.lock().await;
        let mut page: Vec<ChatMessage> = inner
            .messages
            .iter()
            .rev()
            .filter(|m| m.room_id == room_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        page.reverse();
        Ok(page)
    }

    async fn is_member(&self, room_id: RoomId, user_id: UserId) -> Result<bool, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .rooms
            .get(&room_id)
            .is_some_and(|room| room.has_participant(user_id)))
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn rooms_for_user(&self, user_id: UserId) -> Result<Vec<RoomId>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .rooms
            .values()
            .filter(|room| room.has_participant(user_id))
            .map(|room| room.id)
            .collect())
    }

    async fn room_by_participants(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Room>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .rooms
            .values()
            .find(|room| room.has_participant(a) && room.has_participant(b))
            .cloned())
    }

    async fn create_room(&self, participants: &[UserId]) -> Result<Room, StoreError> {
        self.create_named_room("", participants).await
    }

    async fn room(&self, room_id: RoomId) -> Result<Option<Room>, StoreError> {
        Ok(self.inner.lock().await.rooms.get(&room_id).cloned())
    }

    async fn delete_room(&self, room_id: RoomId) -> Result<bool, StoreError> {
        self.check_writable()?;

        let mut inner = self.inner.lock().await;
        if inner.rooms.remove(&room_id).is_none() {
            return Ok(false);
        }
        inner.messages.retain(|m| m.room_id != room_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rooms_and_membership() {
        let store = MemoryStore::new();
        let room = store.create_room(&[UserId(1), UserId(2)]).await.unwrap();
        let _other = store.create_room(&[UserId(2), UserId(3)]).await.unwrap();

        assert_eq!(store.rooms_for_user(UserId(1)).await.unwrap(), vec![room.id]);
        assert_eq!(store.rooms_for_user(UserId(2)).await.unwrap().len(), 2);
        assert!(store.is_member(room.id, UserId(2)).await.unwrap());
        assert!(!store.is_member(room.id, UserId(3)).await.unwrap());

        let found = store
            .room_by_participants(UserId(2), UserId(1))
            .await
            .unwrap();
        assert_eq!(found.map(|r| r.id), Some(room.id));
        assert!(store
            .room_by_participants(UserId(1), UserId(3))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_messages_page_newest_window_oldest_first() {
        let store = MemoryStore::new();
        let room = store.create_room(&[UserId(1), UserId(2)]).await.unwrap();

        for i in 0..5 {
            store
                .save_message(&Draft::new(room.id, UserId(1), format!("m{i}")))
                .await
                .unwrap();
        }

        let page = store.messages_page(room.id, 2, 0).await.unwrap();
        let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m3", "m4"]);

        let page = store.messages_page(room.id, 2, 3).await.unwrap();
        let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m0", "m1"]);
    }

    #[tokio::test]
    async fn test_read_only_store_rejects_writes() {
        let store = MemoryStore::new();
        let room = store.create_room(&[UserId(1)]).await.unwrap();

        store.set_writable(false);
        assert!(matches!(
            store.save_message(&Draft::new(room.id, UserId(1), "x")).await,
            Err(StoreError::Backend(_))
        ));
        assert!(store.create_room(&[UserId(1), UserId(2)]).await.is_err());
        assert_eq!(store.message_count().await, 0);
    }

    #[tokio::test]
    async fn test_delete_room_drops_history() {
        let store = MemoryStore::new();
        let room = store.create_room(&[UserId(1), UserId(2)]).await.unwrap();
        let kept = store.create_room(&[UserId(1), UserId(3)]).await.unwrap();
        store
            .save_message(&Draft::new(room.id, UserId(1), "gone"))
            .await
            .unwrap();
        store
            .save_message(&Draft::new(kept.id, UserId(1), "stays"))
            .await
            .unwrap();

        assert!(store.delete_room(room.id).await.unwrap());
        assert!(!store.delete_room(room.id).await.unwrap());

        assert!(store.room(room.id).await.unwrap().is_none());
        assert!(!store.is_member(room.id, UserId(2)).await.unwrap());
        assert_eq!(store.rooms_for_user(UserId(1)).await.unwrap(), vec![kept.id]);
        assert_eq!(store.message_count().await, 1);
    }

    #[tokio::test]
    async fn test_save_into_unknown_room() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.save_message(&Draft::new(RoomId(99), UserId(1), "x")).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
