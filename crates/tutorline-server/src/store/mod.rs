//! Storage backends.
//!
//! The chat hub only needs the message and room contracts from
//! `tutorline-core`. The server adds user accounts on top and wires one
//! backend for all three.

mod postgres;
mod users;

pub use postgres::PgStore;
pub use users::MemoryUserStore;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use tutorline_core::{MemoryStore, MessageStore, Role, RoomStore, StoreError, UserId};

use crate::config::{StorageBackend, StorageConfig};

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Fields of an account about to be created.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub password_hash: String,
}

/// Account persistence.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Every account with `role`, oldest first.
    async fn users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError>;

    /// Create an account. A phone number already in use is a
    /// [`StoreError::Conflict`].
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
}

/// The stores behind one backend.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserStore>,
    pub messages: Arc<dyn MessageStore>,
    pub rooms: Arc<dyn RoomStore>,
}

impl Storage {
    /// Everything in process memory.
    #[must_use]
    pub fn memory() -> Self {
        let chat = Arc::new(MemoryStore::new());
        Self {
            users: Arc::new(MemoryUserStore::new()),
            messages: chat.clone(),
            rooms: chat,
        }
    }

    /// Open the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached or migrated.
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        match config.backend {
            StorageBackend::Memory => {
                info!("Using in-memory storage");
                Ok(Self::memory())
            }
            StorageBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("storage.database_url is not set")?;
                let store = Arc::new(PgStore::connect(url, config.max_connections).await?);
                info!("Using PostgreSQL storage");
                Ok(Self {
                    users: store.clone(),
                    messages: store.clone(),
                    rooms: store,
                })
            }
        }
    }
}
