//! WebSocket ingress.
//!
//! Authenticates the upgrade request, loads the caller's rooms, then hands
//! the socket to the chat hub. Every refusal happens before the upgrade so
//! a rejected client never sees an open socket.

use std::net::SocketAddr;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, error, warn};
use tutorline_core::{Identity, RoomId};
use tutorline_transport::websocket;

use super::AuthUser;
use crate::error::ApiError;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::state::AppState;

/// WebSocket upgrade handler.
pub async fn ws_handler(
    AuthUser(identity): AuthUser,
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let Ok(permit) = state.connection_slots.clone().try_acquire_owned() else {
        warn!(user = %identity.user_id, "Connection limit reached");
        metrics::record_rejection("capacity");
        return Err(ApiError::Unavailable("too many connections".into()));
    };

    let rooms = state.sessions.bootstrap(identity.user_id).await.map_err(|e| {
        metrics::record_rejection("bootstrap");
        ApiError::Internal(e.to_string())
    })?;

    debug!(user = %identity.user_id, rooms = rooms.len(), %remote, "Upgrading connection");

    let max_message_size = state.config.limits.max_message_size;
    Ok(ws
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, identity, rooms, remote, permit)))
}

/// Drive one upgraded socket until both pumps finish.
async fn handle_websocket(
    socket: WebSocket,
    state: AppState,
    identity: Identity,
    rooms: Vec<RoomId>,
    remote: SocketAddr,
    _permit: OwnedSemaphorePermit,
) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (sink, stream) = websocket::split(
        socket,
        state.config.limits.max_message_size,
        Some(remote.to_string()),
    );

    match state.sessions.start(identity, rooms, sink, stream).await {
        Ok(tasks) => tasks.join().await,
        Err(e) => {
            error!(user = %identity.user_id, error = %e, "Hub unavailable, dropping connection");
            metrics::record_error("hub_closed");
        }
    }
}
