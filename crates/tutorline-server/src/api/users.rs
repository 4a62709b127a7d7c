//! Account endpoints: registration, login and logout.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use tutorline_core::{Identity, Role, UserId};

use super::AuthUser;
use crate::auth::{hash_password, verify_password};
use crate::error::ApiError;
use crate::metrics;
use crate::state::AppState;
use crate::store::{NewUser, User};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub phone: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub phone: String,
    pub password: String,
}

/// `POST /api/v1/register`
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let phone = req.phone.trim();
    if phone.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("phone and password are required".into()));
    }

    let user = state
        .users
        .create_user(NewUser {
            phone: phone.to_string(),
            first_name: req.first_name,
            last_name: req.last_name,
            role: req.role,
            password_hash: hash_password(&req.password)?,
        })
        .await?;

    info!(user = %user.id, role = %user.role, "Registered user");
    Ok((StatusCode::CREATED, Json(user)))
}

/// `POST /api/v1/login`
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(user) = state.users.find_by_phone(req.phone.trim()).await? else {
        metrics::record_login("unknown_user");
        return Err(ApiError::NotFound("user not found".into()));
    };

    if !verify_password(&req.password, &user.password_hash) {
        metrics::record_login("wrong_password");
        return Err(ApiError::Forbidden("invalid credentials".into()));
    }

    let token = state.auth.issue(Identity::new(user.id, user.role))?;
    metrics::record_login("ok");
    debug!(user = %user.id, "Issued session token");

    Ok((
        [(header::SET_COOKIE, state.auth.session_cookie(&token))],
        Json(json!({ "token": token })),
    ))
}

/// `POST /api/v1/logout`
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, state.auth.expired_cookie())],
        Json(json!({ "status": "ok" })),
    )
}

/// `GET /api/v1/users/:id`
pub async fn get_user(
    AuthUser(_caller): AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    state
        .users
        .find_by_id(UserId(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("user not found".into()))
}

/// `GET /api/v1/users/teachers`
pub async fn list_teachers(
    AuthUser(_caller): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.users.users_by_role(Role::Teacher).await?))
}

/// `GET /api/v1/users/students`
pub async fn list_students(
    AuthUser(_caller): AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.users.users_by_role(Role::Student).await?))
}
