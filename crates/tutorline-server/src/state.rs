//! Shared server state.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tutorline_core::{HubHandle, MessageStore, RoomStore, SessionContext};

use crate::auth::Authenticator;
use crate::config::Config;
use crate::store::{Storage, UserStore};

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,
    /// Token issuer and validator.
    pub auth: Authenticator,
    pub users: Arc<dyn UserStore>,
    pub messages: Arc<dyn MessageStore>,
    pub rooms: Arc<dyn RoomStore>,
    /// Hub handle plus everything a connection's pumps need.
    pub sessions: SessionContext,
    /// One permit per open WebSocket.
    pub connection_slots: Arc<Semaphore>,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config, storage: Storage, hub: HubHandle) -> Self {
        let sessions = SessionContext::new(
            hub,
            storage.messages.clone(),
            storage.rooms.clone(),
            config.session(),
        );

        Self {
            auth: Authenticator::from_config(&config.auth),
            connection_slots: Arc::new(Semaphore::new(config.limits.max_connections)),
            users: storage.users,
            messages: storage.messages,
            rooms: storage.rooms,
            sessions,
            config: Arc::new(config),
        }
    }

    #[must_use]
    pub fn hub(&self) -> &HubHandle {
        self.sessions.hub()
    }
}
