//! Session lifecycle endpoints

use crate::error::ApiResult;
use crate::middleware::OwnerContext;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use mirror_core::{MirrorError, Session};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub account_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
    pub account_id: String,
    pub expires_at: DateTime<Utc>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id,
            account_id: session.account_id,
            expires_at: session.expires_at,
        }
    }
}

pub async fn create_session(
    State(state): State<AppState>,
    owner: OwnerContext,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let session = state
        .sessions
        .create(&owner.owner_id, &request.account_id)
        .await?;
    Ok(Json(session.into()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionResponse>,
}

/// Status probe: answers for invalid sessions instead of failing, so a
/// client can poll without tripping error handling.
pub async fn session_status(
    State(state): State<AppState>,
    owner: OwnerContext,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionStatusResponse>> {
    let response = match state
        .sessions
        .validate(&session_id, Some(&owner.owner_id))
        .await
    {
        Ok(session) => SessionStatusResponse {
            valid: true,
            reason: None,
            session: Some(session.into()),
        },
        Err(e) => SessionStatusResponse {
            valid: false,
            reason: Some(e.to_string()),
            session: None,
        },
    };
    Ok(Json(response))
}

pub async fn renew_session(
    State(state): State<AppState>,
    owner: OwnerContext,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionResponse>> {
    state
        .sessions
        .validate(&session_id, Some(&owner.owner_id))
        .await?;
    let renewed = state
        .sessions
        .renew(&session_id)
        .await?
        .ok_or_else(|| MirrorError::not_found(format!("session {session_id}")))?;
    Ok(Json(renewed.into()))
}

/// Destroying is idempotent; an unknown or already-expired id still answers
/// 204. An owner mismatch on a live session is rejected.
pub async fn destroy_session(
    State(state): State<AppState>,
    owner: OwnerContext,
    Path(session_id): Path<String>,
) -> ApiResult<StatusCode> {
    match state
        .sessions
        .validate(&session_id, Some(&owner.owner_id))
        .await
    {
        Ok(_) => {}
        Err(e) if e.is_expired_session() || matches!(e, MirrorError::NotFound { .. }) => {}
        Err(e) => return Err(e.into()),
    }

    state.sessions.destroy(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
