//! The hub coordination loop.
//!
//! A single task owns the [`Registry`]. Everything else reaches it through a
//! [`HubHandle`], which turns each call into a request on one of the hub's
//! channels:
//!
//! - register: add a connection
//! - unregister: remove a connection and close its outbox
//! - broadcast: fan a persisted message out to a room's subscribers
//! - query: read-only stats and room membership updates
//!
//! Requests on one channel are processed in arrival order.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};
use tutorline_protocol::{ChatMessage, RoomId, UserId};
use tutorline_transport::ConnectionId;

use crate::connection::Connection;
use crate::registry::{FanoutReport, Registry};

/// Hub errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HubError {
    /// The coordination loop is no longer running.
    #[error("Hub is closed")]
    Closed,
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each request channel.
    pub request_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            request_capacity: 1024,
        }
    }
}

/// Point-in-time view of the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Live connections.
    pub connections: usize,
    /// Rooms with at least one live subscriber.
    pub rooms: usize,
    /// Outbox pushes that succeeded since startup.
    pub delivered_total: u64,
    /// Connections evicted by backpressure since startup.
    pub evicted_total: u64,
}

struct Register {
    connection: Connection,
    ack: oneshot::Sender<bool>,
}

struct Broadcast {
    message: Arc<ChatMessage>,
    report: Option<oneshot::Sender<FanoutReport>>,
}

enum Query {
    JoinRoom {
        room_id: RoomId,
        members: Vec<UserId>,
        ack: oneshot::Sender<usize>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

/// The coordination loop and the registry it owns.
pub struct Hub {
    registry: Registry,
    register_rx: mpsc::Receiver<Register>,
    unregister_rx: mpsc::Receiver<ConnectionId>,
    broadcast_rx: mpsc::Receiver<Broadcast>,
    query_rx: mpsc::Receiver<Query>,
}

/// Cloneable handle for talking to a running [`Hub`].
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Register>,
    unregister_tx: mpsc::Sender<ConnectionId>,
    broadcast_tx: mpsc::Sender<Broadcast>,
    query_tx: mpsc::Sender<Query>,
}

impl Hub {
    /// Create a hub and the handle that feeds it.
    ///
    /// The hub does nothing until [`Hub::run`] is polled.
    #[must_use]
    pub fn new(config: HubConfig) -> (Self, HubHandle) {
        let capacity = config.request_capacity.max(1);
        let (register_tx, register_rx) = mpsc::channel(capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(capacity);
        let (query_tx, query_rx) = mpsc::channel(capacity);

        let hub = Self {
            registry: Registry::new(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            query_rx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            query_tx,
        };

        (hub, handle)
    }

    /// Create a hub and run it on the current tokio runtime.
    #[must_use]
    pub fn spawn(config: HubConfig) -> HubHandle {
        let (hub, handle) = Self::new(config);
        tokio::spawn(hub.run());
        handle
    }

    /// Run the coordination loop.
    ///
    /// Returns once every [`HubHandle`] has been dropped. Remaining
    /// connections are dropped with the registry, which closes their outboxes.
    pub async fn run(mut self) {
        info!("Hub started");

        loop {
            tokio::select! {
                Some(request) = self.register_rx.recv() => self.handle_register(request),
                Some(id) = self.unregister_rx.recv() => self.handle_unregister(&id),
                Some(request) = self.broadcast_rx.recv() => self.handle_broadcast(request),
                Some(query) = self.query_rx.recv() => self.handle_query(query),
                else => break,
            }
        }

        info!(connections = self.registry.len(), "Hub stopped");
    }

    fn handle_register(&mut self, request: Register) {
        let Register { connection, ack } = request;
        let id = connection.id().clone();
        let user = connection.user_id();
        let rooms = connection.rooms().len();

        let inserted = self.registry.insert(connection);
        if inserted {
            info!(
                connection = %id,
                user = %user,
                rooms,
                total = self.registry.len(),
                "Connection registered"
            );
        } else {
            warn!(connection = %id, "Ignoring duplicate registration");
        }

        let _ = ack.send(inserted);
    }

    fn handle_unregister(&mut self, id: &ConnectionId) {
        match self.registry.remove(id) {
            Some(connection) => info!(
                connection = %id,
                user = %connection.user_id(),
                total = self.registry.len(),
                "Connection unregistered"
            ),
            None => trace!(connection = %id, "Unregister for unknown connection"),
        }
    }

    fn handle_broadcast(&mut self, request: Broadcast) {
        let report = self.registry.fanout(&request.message);

        debug!(
            message = %request.message.id,
            room = %request.message.room_id,
            delivered = report.delivered,
            evicted = report.evicted,
            "Broadcast"
        );

        if let Some(reply) = request.report {
            let _ = reply.send(report);
        }
    }

    fn handle_query(&mut self, query: Query) {
        match query {
            Query::JoinRoom {
                room_id,
                members,
                ack,
            } => {
                let joined = self.registry.join_room(room_id, &members);
                debug!(room = %room_id, joined, "Room joined by live connections");
                let _ = ack.send(joined);
            }
            Query::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            connections: self.registry.len(),
            rooms: self.registry.room_count(),
            delivered_total: self.registry.delivered_total(),
            evicted_total: self.registry.evicted_total(),
        }
    }
}

impl HubHandle {
    /// Register a connection.
    ///
    /// Resolves once the hub has applied the request, so any broadcast sent
    /// afterwards sees the connection. Returns `false` if a connection with
    /// the same id was already registered.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub is not running.
    pub async fn register(&self, connection: Connection) -> Result<bool, HubError> {
        let (ack, rx) = oneshot::channel();
        self.register_tx
            .send(Register { connection, ack })
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Remove a connection. Unknown ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub is not running.
    pub async fn unregister(&self, id: ConnectionId) -> Result<(), HubError> {
        self.unregister_tx
            .send(id)
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Queue a message for fan-out without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub is not running.
    pub async fn broadcast(&self, message: ChatMessage) -> Result<(), HubError> {
        self.broadcast_tx
            .send(Broadcast {
                message: Arc::new(message),
                report: None,
            })
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Fan a message out and wait for the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub is not running.
    pub async fn broadcast_with_report(
        &self,
        message: ChatMessage,
    ) -> Result<FanoutReport, HubError> {
        let (tx, rx) = oneshot::channel();
        self.broadcast_tx
            .send(Broadcast {
                message: Arc::new(message),
                report: Some(tx),
            })
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Subscribe every live connection of `members` to `room_id`.
    ///
    /// Resolves with the number of connections that gained the room.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub is not running.
    pub async fn join_room(
        &self,
        room_id: RoomId,
        members: Vec<UserId>,
    ) -> Result<usize, HubError> {
        let (ack, rx) = oneshot::channel();
        self.query_tx
            .send(Query::JoinRoom {
                room_id,
                members,
                ack,
            })
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Current registry statistics.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] if the hub is not running.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        let (reply, rx) = oneshot::channel();
        self.query_tx
            .send(Query::Stats { reply })
            .await
            .map_err(|_| HubError::Closed)?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Whether the coordination loop has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.register_tx.is_closed()
    }
}

impl std::fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}
