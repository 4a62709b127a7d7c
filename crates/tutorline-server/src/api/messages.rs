//! Sending over plain HTTP.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tutorline_core::{ChatMessage, RoomId, SendRequest, UserId};

use super::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Same addressing as a WebSocket `send` frame.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub target_user_id: Option<UserId>,
    pub content: String,
}

impl From<SendMessageRequest> for SendRequest {
    fn from(req: SendMessageRequest) -> Self {
        Self {
            room_id: req.room_id,
            target_user_id: req.target_user_id,
            content: req.content,
        }
    }
}

/// `POST /api/v1/messages`
///
/// Goes through the same route, persist and broadcast path as the socket,
/// so live members see the message immediately.
pub async fn send_message(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ChatMessage>), ApiError> {
    let message = state.sessions.dispatch(caller, req.into()).await?;

    Ok((StatusCode::CREATED, Json(message)))
}
