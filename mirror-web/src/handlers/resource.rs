//! Static resource proxy
//!
//! Serves `/static/{ref}` requests: validates the session, maps the local
//! reference back to its upstream URL, fetches it through the fallback
//! policy, rewrites CSS bodies, and relays everything else byte-for-byte
//! with an inferred Content-Type and a bounded public cache lifetime.

use crate::error::{ApiError, ApiResult};
use crate::middleware::MirrorIdentity;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Response};
use mirror_core::{MirrorError, RewriteContext};
use mirror_rewrite::{append_query, infer_content_type, is_font_path, resolve_upstream};
use std::collections::HashMap;
use tracing::debug;

const CACHE_POLICY: &str = "public, max-age=3600";

pub async fn get_static(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> ApiResult<Response<Body>> {
    let identity = MirrorIdentity::extract(&query, &headers)?;
    let session = state.sessions.validate(&identity.session_id, None).await?;
    if session.account_id != identity.account_id {
        return Err(MirrorError::auth("session is bound to a different account").into());
    }

    // Carry the original query forward, minus the identity tags the proxy
    // consumed.
    let mut passthrough: Vec<(String, String)> = query
        .into_iter()
        .filter(|(key, _)| key != "accountId" && key != "sessionId")
        .collect();
    passthrough.sort();

    let upstream = resolve_upstream(&path, &state.config.upstream.base_url)?;
    let url = append_query(&upstream, &passthrough);

    let result = state
        .coordinator
        .fetch_resource(&identity.account_id, &url)
        .await?;
    state.sessions.update_activity(&identity.session_id).await;

    let content_type = infer_content_type(&path, result.content_type());
    debug!(
        account_id = %identity.account_id,
        url = %url,
        status = result.status_code,
        content_type = %content_type,
        "resource proxied"
    );

    let mut builder = Response::builder()
        .status(result.status_code)
        .header(header::CONTENT_TYPE, content_type);
    // Only successful bodies are cacheable; relayed upstream errors must
    // not be pinned in shared caches.
    if (200..300).contains(&result.status_code) {
        builder = builder.header(header::CACHE_CONTROL, CACHE_POLICY);
    }
    if is_font_path(&path) {
        builder = builder.header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*");
    }

    let body = if result.is_css() {
        let ctx = RewriteContext {
            account_id: identity.account_id,
            session_id: identity.session_id,
            base_url: state.config.upstream.base_url.clone(),
        };
        Body::from(state.rewriter.rewrite_css(&result.text(), &ctx))
    } else {
        Body::from(result.body)
    };

    builder.body(body).map_err(|e| {
        ApiError::from(MirrorError::internal(format!(
            "failed to build resource response: {e}"
        )))
    })
}
