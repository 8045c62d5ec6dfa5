//! Upstream API proxy
//!
//! Forwards any method under `/api/{path}` to the upstream API with the
//! account's replayed credentials, after validating the session carried in
//! the mirror headers. Hop-by-hop and identity headers are stripped in both
//! directions; upstream status, body, and remaining headers relay verbatim.

use crate::error::{ApiError, ApiResult};
use crate::middleware::{MirrorIdentity, ACCOUNT_HEADER, SESSION_HEADER};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, Response};
use bytes::Bytes;
use mirror_core::{MirrorError, MirrorResult};
use mirror_rewrite::append_query;
use std::collections::HashMap;
use tracing::debug;

/// Transport-specific headers that must not be forwarded either way.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
    "accept-encoding",
    "cookie",
];

fn forwardable(name: &str) -> bool {
    !HOP_BY_HOP.contains(&name) && name != ACCOUNT_HEADER && name != SESSION_HEADER
}

fn filtered_request_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| forwardable(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

pub async fn proxy_api(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response<Body>> {
    let identity = MirrorIdentity::extract(&query, &headers)?;
    let session = state.sessions.validate(&identity.session_id, None).await?;
    if session.account_id != identity.account_id {
        return Err(MirrorError::auth("session is bound to a different account").into());
    }

    let upstream = &state.config.upstream;
    let base = format!(
        "{}{}/{}",
        upstream.base_url,
        upstream.api_prefix.trim_end_matches('/'),
        path
    );
    let mut passthrough: Vec<(String, String)> = query
        .into_iter()
        .filter(|(key, _)| key != "accountId" && key != "sessionId")
        .collect();
    passthrough.sort();
    let url = append_query(&base, &passthrough);

    let forward_headers = filtered_request_headers(&headers);
    let request_body = if body.is_empty() { None } else { Some(body) };

    let result = state
        .coordinator
        .fetch_api(
            &identity.account_id,
            &url,
            method.as_str(),
            request_body,
            &forward_headers,
        )
        .await?;
    state.sessions.update_activity(&identity.session_id).await;

    debug!(
        account_id = %identity.account_id,
        method = %method,
        url = %url,
        status = result.status_code,
        degraded = result.degraded,
        "api call proxied"
    );

    relay(result).map_err(ApiError::from)
}

fn relay(result: mirror_core::FetchResult) -> MirrorResult<Response<Body>> {
    let mut builder = Response::builder().status(result.status_code);
    for (name, value) in &result.headers {
        if forwardable(name) && name != "set-cookie" {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }
    builder
        .body(Body::from(result.body))
        .map_err(|e| MirrorError::internal(format!("failed to build api response: {e}")))
}
