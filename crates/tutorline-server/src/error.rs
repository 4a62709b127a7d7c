//! HTTP error responses.
//!
//! Every handler failure is turned into a status code and a JSON body of
//! the form `{"error": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use tutorline_core::{DispatchError, RouteError, StoreError};

use crate::auth::AuthError;

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("internal server error")]
    Internal(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            error!(%detail, "Request failed");
            crate::metrics::record_error("http_internal");
        }

        let body = Json(json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ApiError::NotFound(format!("{what} not found")),
            StoreError::Conflict(what) => ApiError::Conflict(what),
            StoreError::Backend(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Route(RouteError::ReadOnly(_)) | DispatchError::NotMember(_) => {
                ApiError::Forbidden(e.to_string())
            }
            DispatchError::Route(_) => ApiError::BadRequest(e.to_string()),
            DispatchError::Store { source, .. } => ApiError::from(source),
            DispatchError::Hub(_) => ApiError::Unavailable("chat hub is not running".into()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Hash(detail) => ApiError::Internal(detail),
            other => {
                warn!(error = %other, "Rejected credentials");
                ApiError::Unauthorized
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(StoreError::Conflict("phone".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(StoreError::Backend("down".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(AuthError::Missing).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_dispatch_mapping() {
        use tutorline_core::{HubError, Role, RoomId};

        let status = |e: DispatchError| ApiError::from(e).status();
        assert_eq!(
            status(RouteError::ReadOnly(Role::Supervisor).into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status(RouteError::EmptyContent.into()), StatusCode::BAD_REQUEST);
        assert_eq!(status(DispatchError::NotMember(RoomId(1))), StatusCode::FORBIDDEN);
        assert_eq!(status(HubError::Closed.into()), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status(DispatchError::Store {
                step: "persist message",
                source: StoreError::Backend("down".into()),
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let err = ApiError::Internal("connection refused".into());
        assert_eq!(err.to_string(), "internal server error");
    }
}
