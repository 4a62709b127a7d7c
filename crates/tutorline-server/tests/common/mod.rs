//! Spawns a server on an ephemeral port for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tutorline_core::{Hub, HubConfig, HubHandle, Identity, MemoryStore, Role, UserId};
use tutorline_server::auth::Authenticator;
use tutorline_server::store::MemoryUserStore;
use tutorline_server::{AppState, Config, Storage};

pub const JWT_SECRET: &str = "integration-test-secret";

pub struct TestServer {
    pub addr: SocketAddr,
    pub chat: Arc<MemoryStore>,
    pub hub: HubHandle,
    pub auth: Authenticator,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(Config::default()).await
    }

    pub async fn start_with(mut config: Config) -> Self {
        config.auth.jwt_secret = JWT_SECRET.to_string();

        let chat = Arc::new(MemoryStore::new());
        let storage = Storage {
            users: Arc::new(MemoryUserStore::new()),
            messages: chat.clone(),
            rooms: chat.clone(),
        };
        let hub = Hub::spawn(HubConfig::default());
        let auth = Authenticator::from_config(&config.auth);
        let state = AppState::new(config, storage, hub.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            tutorline_server::serve(listener, state).await.unwrap();
        });

        Self {
            addr,
            chat,
            hub,
            auth,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// A valid token for a user that never registered over HTTP.
    pub fn token(&self, user_id: i64, role: Role) -> String {
        self.auth
            .issue(Identity::new(UserId(user_id), role))
            .unwrap()
    }
}
