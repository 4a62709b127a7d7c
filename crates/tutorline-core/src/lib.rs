//! # tutorline-core
//!
//! Chat hub, connection registry and message routing for Tutorline.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Connection** - a live client with an outbox and a room subscription set
//! - **Registry** - live connections indexed by id and by room
//! - **Hub** - single task that owns the registry and performs fan-out
//! - **Session** - per-connection read and write pumps
//! - **Store** - persistence contracts plus an in-memory implementation
//!
//! ## Architecture
//!
//! ```text
//! +-----------+  register  +-----------+   outbox   +------------+
//! |  Ingress  |----------->|    Hub    |----------->| write loop |--> client
//! +-----------+            +-----------+            +------------+
//!                                ^ broadcast / unregister
//!                          +-----------+  persist   +------------+
//!            client ------>| read loop |----------->|   Store    |
//!                          +-----------+            +------------+
//! ```

pub mod connection;
pub mod hub;
pub mod memory;
pub mod message;
pub mod registry;
pub mod route;
pub mod session;
pub mod store;

pub use connection::{Connection, Identity, Outbox};
pub use hub::{Hub, HubConfig, HubError, HubHandle, HubStats};
pub use memory::MemoryStore;
pub use message::Draft;
pub use registry::{FanoutReport, Registry};
pub use route::{RouteError, SendRequest, SendRoute};
pub use session::{DispatchError, SessionConfig, SessionContext, SessionTasks};
pub use store::{MessageStore, Room, RoomStore, StoreError};

pub use tutorline_protocol::{ChatMessage, MessageId, Role, RoomId, UserId};
pub use tutorline_transport::ConnectionId;
