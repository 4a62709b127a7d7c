//! Hub-side view of a live client.
//!
//! A [`Connection`] is what the hub stores in its registry: who the client
//! is, which rooms it receives, and the sending end of its outbox. The
//! receiving end, [`Outbox`], belongs to the connection's write loop.
//! Dropping the last `Connection` closes the outbox, which is how the hub
//! tells a writer to stop.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tutorline_protocol::{ChatMessage, Role, RoomId, UserId};
use tutorline_transport::ConnectionId;

/// Verified identity of a connected user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

impl Identity {
    #[must_use]
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

/// Registry entry for one live client.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    identity: Identity,
    rooms: HashSet<RoomId>,
    outbox: mpsc::Sender<Arc<ChatMessage>>,
}

/// Receiving end of a connection's outbox.
#[derive(Debug)]
pub struct Outbox {
    rx: mpsc::Receiver<Arc<ChatMessage>>,
}

impl Connection {
    /// Create a connection and its outbox.
    ///
    /// `capacity` bounds the number of undelivered messages; a connection
    /// whose outbox is full when the hub fans out is evicted.
    #[must_use]
    pub fn new(
        id: ConnectionId,
        identity: Identity,
        rooms: impl IntoIterator<Item = RoomId>,
        capacity: usize,
    ) -> (Self, Outbox) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id,
                identity,
                rooms: rooms.into_iter().collect(),
                outbox: tx,
            },
            Outbox { rx },
        )
    }

    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    #[must_use]
    pub fn identity(&self) -> Identity {
        self.identity
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    /// Rooms this connection receives broadcasts for.
    #[must_use]
    pub fn rooms(&self) -> &HashSet<RoomId> {
        &self.rooms
    }

    #[must_use]
    pub fn is_subscribed(&self, room_id: RoomId) -> bool {
        self.rooms.contains(&room_id)
    }

    /// Add a room. Returns `true` if it was not already present.
    pub(crate) fn subscribe(&mut self, room_id: RoomId) -> bool {
        self.rooms.insert(room_id)
    }

    /// Push without waiting.
    pub(crate) fn try_deliver(
        &self,
        message: Arc<ChatMessage>,
    ) -> Result<(), TrySendError<Arc<ChatMessage>>> {
        self.outbox.try_send(message)
    }
}

impl Outbox {
    /// Wait for the next message. `None` once the hub dropped the connection.
    pub async fn recv(&mut self) -> Option<Arc<ChatMessage>> {
        self.rx.recv().await
    }

    /// Take a queued message without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<ChatMessage>> {
        self.rx.try_recv().ok()
    }

    /// Whether the sending side is gone and nothing is left to drain.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed() && self.rx.is_empty()
    }
}
