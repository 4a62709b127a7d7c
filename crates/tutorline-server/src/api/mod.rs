//! HTTP routes.
//!
//! The REST endpoints are thin wrappers over the stores, except
//! `POST /api/v1/messages` which sends through the chat hub like the
//! WebSocket route does.

mod chats;
mod messages;
mod users;
mod ws;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderValue, Method};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use tutorline_core::Identity;

use crate::error::ApiError;
use crate::state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors.allowed_origins);

    Router::new()
        .route("/health", get(health_handler))
        .route(&state.config.transport.websocket_path, get(ws::ws_handler))
        .route("/api/v1/register", post(users::register))
        .route("/api/v1/login", post(users::login))
        .route("/api/v1/logout", post(users::logout))
        .route("/api/v1/users/teachers", get(users::list_teachers))
        .route("/api/v1/users/students", get(users::list_students))
        .route("/api/v1/users/:id", get(users::get_user))
        .route("/api/v1/users/:id/chats", get(chats::list_user_chats))
        .route("/api/v1/chats", get(chats::list_chats))
        .route("/api/v1/chats/with/:user_id", get(chats::conversation))
        .route("/api/v1/chats/:id", get(chats::get_chat).delete(chats::delete_chat))
        .route("/api/v1/chats/:id/messages", get(chats::list_messages))
        .route("/api/v1/messages", post(messages::send_message))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Identity of an authenticated caller, from the session cookie or a
/// bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let identity = state.auth.authenticate(&parts.headers)?;
        Ok(Self(identity))
    }
}
