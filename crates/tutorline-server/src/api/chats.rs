//! Chats, their history and deletion.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;
use tutorline_core::{ChatMessage, Identity, Role, Room, RoomId, UserId};

use super::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;
/// Messages returned for a two-party conversation.
const CONVERSATION_TAIL: usize = 30;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PageQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

async fn rooms_of(state: &AppState, user_id: UserId) -> Result<Vec<Room>, ApiError> {
    let ids = state.rooms.rooms_for_user(user_id).await?;

    let mut rooms = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(room) = state.rooms.room(id).await? {
            rooms.push(room);
        }
    }
    Ok(rooms)
}

/// The room, if `caller` may see it. Supervisors see every room.
async fn visible_room(
    state: &AppState,
    caller: Identity,
    room_id: RoomId,
) -> Result<Room, ApiError> {
    let room = state
        .rooms
        .room(room_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("chat not found".into()))?;

    if caller.role != Role::Supervisor && !room.has_participant(caller.user_id) {
        return Err(ApiError::Forbidden("not a member of this chat".into()));
    }
    Ok(room)
}

/// `GET /api/v1/chats`
pub async fn list_chats(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Room>>, ApiError> {
    Ok(Json(rooms_of(&state, caller.user_id).await?))
}

/// `GET /api/v1/users/:id/chats`, supervisors only.
pub async fn list_user_chats(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Room>>, ApiError> {
    if caller.role != Role::Supervisor {
        return Err(ApiError::Forbidden("only supervisors can list other users' chats".into()));
    }
    Ok(Json(rooms_of(&state, UserId(id)).await?))
}

/// `GET /api/v1/chats/:id`
pub async fn get_chat(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Room>, ApiError> {
    Ok(Json(visible_room(&state, caller, RoomId(id)).await?))
}

/// `GET /api/v1/chats/with/:user_id`
///
/// The latest messages of the caller's chat with `user_id`, or `null` when
/// the two have never talked.
pub async fn conversation(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Option<Vec<ChatMessage>>>, ApiError> {
    let other = UserId(user_id);
    if other == caller.user_id {
        return Err(ApiError::BadRequest("cannot open a chat with yourself".into()));
    }

    let Some(room) = state.rooms.room_by_participants(caller.user_id, other).await? else {
        return Ok(Json(None));
    };

    let messages = state
        .messages
        .messages_page(room.id, CONVERSATION_TAIL, 0)
        .await?;
    Ok(Json(Some(messages)))
}

/// `DELETE /api/v1/chats/:id`
pub async fn delete_chat(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let room = visible_room(&state, caller, RoomId(id)).await?;

    if !state.rooms.delete_room(room.id).await? {
        return Err(ApiError::NotFound("chat not found".into()));
    }

    info!(room = %room.id, user = %caller.user_id, "Chat deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/v1/chats/:id/messages?limit&offset`
pub async fn list_messages(
    AuthUser(caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let room_id = visible_room(&state, caller, RoomId(id)).await?.id;

    let messages = state
        .messages
        .messages_page(room_id, page.limit(), page.offset())
        .await?;

    Ok(Json(messages))
}
