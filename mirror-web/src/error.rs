//! Error-to-status mapping for the HTTP boundary
//!
//! The single place where the core taxonomy becomes response codes.
//! Per-request errors never terminate the process.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mirror_core::MirrorError;
use serde_json::json;
use tracing::error;

pub struct ApiError(pub MirrorError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<MirrorError> for ApiError {
    fn from(err: MirrorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            MirrorError::Validation { .. } => (StatusCode::BAD_REQUEST, self.0.to_string()),
            MirrorError::Auth { .. } => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            MirrorError::NotFound { .. } => (StatusCode::NOT_FOUND, self.0.to_string()),
            MirrorError::UpstreamBlocked { .. } => (StatusCode::BAD_GATEWAY, self.0.to_string()),
            MirrorError::UpstreamUnavailable { .. } | MirrorError::Timeout { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, self.0.to_string())
            }
            other => {
                error!(error = %other, "internal error while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
