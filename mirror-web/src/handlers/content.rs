//! Initial page fetch
//!
//! Fetches the upstream application's entry page through the heavy backend
//! (challenges expected on a cold hit) and returns it rewritten for the
//! requesting identity.

use crate::error::ApiResult;
use crate::middleware::OwnerContext;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::Json;
use mirror_core::{MirrorError, RewriteContext};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentQuery {
    pub account_id: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentResponse {
    pub content: String,
    pub status: u16,
    pub url: String,
    pub degraded: bool,
}

pub async fn get_content(
    State(state): State<AppState>,
    owner: OwnerContext,
    Query(query): Query<ContentQuery>,
) -> ApiResult<Json<ContentResponse>> {
    let session = state
        .sessions
        .validate(&query.session_id, Some(&owner.owner_id))
        .await?;
    if session.account_id != query.account_id {
        return Err(MirrorError::auth("session is bound to a different account").into());
    }

    let base_url = state.config.upstream.base_url.clone();
    let result = state
        .coordinator
        .fetch_page(&query.account_id, &base_url)
        .await?;

    let ctx = RewriteContext {
        account_id: query.account_id.clone(),
        session_id: query.session_id.clone(),
        base_url,
    };
    let content = state.rewriter.rewrite_html(&result.text(), &ctx)?;

    state.sessions.update_activity(&query.session_id).await;
    info!(
        account_id = %query.account_id,
        status = result.status_code,
        degraded = result.degraded,
        "page mirrored"
    );

    Ok(Json(ContentResponse {
        content,
        status: result.status_code,
        url: result.final_url,
        degraded: result.degraded,
    }))
}
