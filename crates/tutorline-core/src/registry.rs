//! Connection registry owned by the hub.
//!
//! The registry maintains two maps:
//! - `connection → entry`: every live [`Connection`]
//! - `room → connections`: which connections receive a room's broadcasts
//!
//! It is plain synchronous state. Only the hub's coordination loop holds
//! one, so no method needs a lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use tutorline_protocol::{ChatMessage, RoomId, UserId};
use tutorline_transport::ConnectionId;

use crate::connection::Connection;

/// Outcome of fanning one message out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Connections whose outbox accepted the message.
    pub delivered: usize,
    /// Connections dropped because their outbox was full or closed.
    pub evicted: usize,
}

/// Registry of live connections.
#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, Connection>,
    by_room: HashMap<RoomId, HashSet<ConnectionId>>,
    delivered_total: u64,
    evicted_total: u64,
}

impl Registry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection.
    ///
    /// Returns `false` (and leaves the registry untouched) if a connection
    /// with the same id is already present.
    pub fn insert(&mut self, connection: Connection) -> bool {
        if self.connections.contains_key(connection.id()) {
            return false;
        }

        for room in connection.rooms() {
            self.by_room
                .entry(*room)
                .or_default()
                .insert(connection.id().clone());
        }
        self.connections.insert(connection.id().clone(), connection);
        true
    }

    /// Remove a connection and its room index entries.
    ///
    /// Dropping the returned value closes the connection's outbox.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(id)?;

        for room in connection.rooms() {
            if let Some(members) = self.by_room.get_mut(room) {
                members.remove(id);
                if members.is_empty() {
                    self.by_room.remove(room);
                }
            }
        }

        Some(connection)
    }

    /// Subscribe every live connection of `members` to `room_id`.
    ///
    /// Returns the number of connections that gained the room.
    pub fn join_room(&mut self, room_id: RoomId, members: &[UserId]) -> usize {
        let mut joined = 0;

        for (id, connection) in self.connections.iter_mut() {
            if members.contains(&connection.user_id()) && connection.subscribe(room_id) {
                self.by_room.entry(room_id).or_default().insert(id.clone());
                joined += 1;
            }
        }

        joined
    }

    /// Push a message into the outbox of every subscriber of its room.
    ///
    /// A subscriber whose outbox is full or closed is removed in the same
    /// step, so one slow client never holds up the others.
    pub fn fanout(&mut self, message: &Arc<ChatMessage>) -> FanoutReport {
        let Some(subscribers) = self.by_room.get(&message.room_id) else {
            return FanoutReport::default();
        };

        let mut report = FanoutReport::default();
        let mut dead = Vec::new();

        for id in subscribers {
            let Some(connection) = self.connections.get(id) else {
                continue;
            };

            match connection.try_deliver(Arc::clone(message)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        connection = %id,
                        user = %connection.user_id(),
                        room = %message.room_id,
                        "Outbox full, evicting slow connection"
                    );
                    dead.push(id.clone());
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(connection = %id, "Outbox closed, evicting connection");
                    dead.push(id.clone());
                }
            }
        }

        for id in dead {
            self.remove(&id);
            report.evicted += 1;
        }

        self.delivered_total += report.delivered as u64;
        self.evicted_total += report.evicted as u64;
        report
    }

    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of rooms with at least one live subscriber.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.by_room.len()
    }

    /// Number of live subscribers of a room.
    #[must_use]
    pub fn subscriber_count(&self, room_id: RoomId) -> usize {
        self.by_room.get(&room_id).map_or(0, HashSet::len)
    }

    #[must_use]
    pub fn delivered_total(&self) -> u64 {
        self.delivered_total
    }

    #[must_use]
    pub fn evicted_total(&self) -> u64 {
        self.evicted_total
    }
}
