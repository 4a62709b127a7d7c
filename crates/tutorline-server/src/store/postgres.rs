use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::debug;
use tutorline_core::{
    ChatMessage, Draft, MessageId, MessageStore, Role, Room, RoomId, RoomStore, StoreError, UserId,
};

use super::{NewUser, User, UserStore};

/// PostgreSQL implementation of every store contract.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable or a migration fails.
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn members(&self, room_id: RoomId) -> Result<Vec<UserId>, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT user_id FROM chat_members WHERE chat_id = $1 ORDER BY user_id",
        )
        .bind(room_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(ids.into_iter().map(UserId).collect())
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound("row".to_string()),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(db.message().to_string())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            StoreError::NotFound(db.message().to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

fn message_from_row(row: &PgRow) -> Result<ChatMessage, sqlx::Error> {
    Ok(ChatMessage {
        id: MessageId(row.try_get("id")?),
        room_id: RoomId(row.try_get("chat_id")?),
        sender_id: UserId(row.try_get("sender_id")?),
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let role: String = row.try_get("role").map_err(backend)?;
    Ok(User {
        id: UserId(row.try_get("id").map_err(backend)?),
        phone: row.try_get("phone").map_err(backend)?,
        first_name: row.try_get("first_name").map_err(backend)?,
        last_name: row.try_get("last_name").map_err(backend)?,
        role: role.parse::<Role>().map_err(StoreError::Backend)?,
        password_hash: row.try_get("password_hash").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

#[async_trait]
impl MessageStore for PgStore {
    async fn save_message(&self, draft: &Draft) -> Result<MessageId, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO messages (chat_id, sender_id, content, created_at)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(draft.room_id.0)
        .bind(draft.sender_id.0)
        .bind(&draft.content)
        .bind(draft.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;

        Ok(MessageId(id))
    }

    async fn messages_page(
        &self,
        room_id: RoomId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, chat_id, sender_id, content, created_at
             FROM messages
             WHERE chat_id = $1
             ORDER BY id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(room_id.0)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter()
            .rev()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)
    }

    async fn is_member(&self, room_id: RoomId, user_id: UserId) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM chat_members WHERE chat_id = $1 AND user_id = $2)",
        )
        .bind(room_id.0)
        .bind(user_id.0)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)
    }
}

#[async_trait]
impl RoomStore for PgStore {
    async fn rooms_for_user(&self, user_id: UserId) -> Result<Vec<RoomId>, StoreError> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT chat_id FROM chat_members WHERE user_id = $1 ORDER BY chat_id",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(ids.into_iter().map(RoomId).collect())
    }

    async fn room_by_participants(
        &self,
        a: UserId,
        b: UserId,
    ) -> Result<Option<Room>, StoreError> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT a.chat_id
             FROM chat_members a
             JOIN chat_members b ON b.chat_id = a.chat_id
             WHERE a.user_id = $1 AND b.user_id = $2
             ORDER BY a.chat_id
             LIMIT 1",
        )
        .bind(a.0)
        .bind(b.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match id {
            Some(id) => self.room(RoomId(id)).await,
            None => Ok(None),
        }
    }

    async fn create_room(&self, participants: &[UserId]) -> Result<Room, StoreError> {
        let mut members = participants.to_vec();
        members.sort();
        members.dedup();

        let mut tx = self.pool.begin().await.map_err(backend)?;

        let row = sqlx::query("INSERT INTO chats (name) VALUES ('') RETURNING id, name, created_at")
            .fetch_one(&mut *tx)
            .await
            .map_err(backend)?;
        let id = RoomId(row.try_get("id").map_err(backend)?);
        let name: String = row.try_get("name").map_err(backend)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(backend)?;

        for member in &members {
            sqlx::query("INSERT INTO chat_members (chat_id, user_id) VALUES ($1, $2)")
                .bind(id.0)
                .bind(member.0)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;
        debug!(room = %id, participants = ?members, "Created room");

        Ok(Room {
            id,
            name,
            participants: members,
            created_at,
        })
    }

    async fn room(&self, room_id: RoomId) -> Result<Option<Room>, StoreError> {
        let Some(row) = sqlx::query("SELECT id, name, created_at FROM chats WHERE id = $1")
            .bind(room_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
        else {
            return Ok(None);
        };

        Ok(Some(Room {
            id: room_id,
            name: row.try_get("name").map_err(backend)?,
            participants: self.members(room_id).await?,
            created_at: row.try_get("created_at").map_err(backend)?,
        }))
    }
    async fn delete_room(&self, room_id: RoomId) -> Result<bool, StoreError> {
        // Members and messages go with it through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM chats WHERE id = $1")
            .bind(room_id.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        debug!(room = %room_id, deleted = result.rows_affected(), "Deleted room");
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError> {
        sqlx::query(
            "SELECT id, phone, first_name, last_name, role, password_hash, created_at
             FROM users WHERE phone = $1",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .as_ref()
        .map(user_from_row)
        .transpose()
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        sqlx::query(
            "SELECT id, phone, first_name, last_name, role, password_hash, created_at
             FROM users WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .as_ref()
        .map(user_from_row)
        .transpose()
    }

    async fn users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        sqlx::query(
            "SELECT id, phone, first_name, last_name, role, password_hash, created_at
             FROM users WHERE role = $1 ORDER BY id",
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?
        .iter()
        .map(user_from_row)
        .collect()
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query(
            "INSERT INTO users (phone, first_name, last_name, role, password_hash)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, phone, first_name, last_name, role, password_hash, created_at",
        )
        .bind(&user.phone)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match backend(e) {
            StoreError::Conflict(_) => {
                StoreError::Conflict(format!("user with phone {} already exists", user.phone))
            }
            other => other,
        })?;

        user_from_row(&row)
    }
}
