//! Request identity extraction
//!
//! The operator-auth collaborator fronting this service supplies the caller
//! identity as an `X-Owner-Id` header. Session-scoped routes fail with an
//! auth error before any core logic runs when it is absent. Proxied
//! resource/API requests instead carry the mirror identity pair, as query
//! parameters (static subresources cannot set headers) or as the
//! `X-Mirror-*` headers the bootstrap script attaches.

use crate::error::ApiError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use mirror_core::{MirrorError, MirrorResult};
use std::collections::HashMap;

pub const OWNER_HEADER: &str = "x-owner-id";
pub const ACCOUNT_HEADER: &str = "x-mirror-account-id";
pub const SESSION_HEADER: &str = "x-mirror-session-id";

/// Caller identity for session lifecycle routes.
#[derive(Debug, Clone)]
pub struct OwnerContext {
    pub owner_id: String,
}

impl<S> FromRequestParts<S> for OwnerContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty());

        match owner {
            Some(owner_id) => Ok(Self {
                owner_id: owner_id.to_string(),
            }),
            None => Err(MirrorError::auth("missing owner identity").into()),
        }
    }
}

/// The (account, session) pair tagged onto proxied requests.
#[derive(Debug, Clone)]
pub struct MirrorIdentity {
    pub account_id: String,
    pub session_id: String,
}

impl MirrorIdentity {
    /// Headers win over query parameters; both forms are accepted on every
    /// proxied route.
    pub fn extract(
        query: &HashMap<String, String>,
        headers: &HeaderMap,
    ) -> MirrorResult<Self> {
        let from_header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let account_id = from_header(ACCOUNT_HEADER)
            .or_else(|| query.get("accountId").cloned())
            .filter(|v| !v.is_empty());
        let session_id = from_header(SESSION_HEADER)
            .or_else(|| query.get("sessionId").cloned())
            .filter(|v| !v.is_empty());

        match (account_id, session_id) {
            (Some(account_id), Some(session_id)) => Ok(Self {
                account_id,
                session_id,
            }),
            _ => Err(MirrorError::auth("missing mirror identity")),
        }
    }
}
