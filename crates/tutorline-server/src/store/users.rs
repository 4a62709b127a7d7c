use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tutorline_core::{Role, StoreError, UserId};

use super::{NewUser, User, UserStore};

/// Accounts held in process memory.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<Vec<User>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.phone == phone).cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.id == id).cloned())
    }

    async fn users_by_role(&self, role: Role) -> Result<Vec<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.iter().filter(|u| u.role == role).cloned().collect())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.phone == user.phone) {
            return Err(StoreError::Conflict(format!(
                "user with phone {} already exists",
                user.phone
            )));
        }

        let created = User {
            id: UserId(users.len() as i64 + 1),
            phone: user.phone,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        users.push(created.clone());
        Ok(created)
    }
}
