//! Route definitions for the mirror server

use crate::{handlers, AppState};
use axum::routing::{any, get, post};
use axum::Router;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/session", post(handlers::session::create_session))
        .route(
            "/session/{session_id}",
            get(handlers::session::session_status).delete(handlers::session::destroy_session),
        )
        .route(
            "/session/{session_id}/renew",
            post(handlers::session::renew_session),
        )
        .route("/content", get(handlers::content::get_content))
        .route("/static/{*path}", get(handlers::resource::get_static))
        .route("/api/{*path}", any(handlers::api::proxy_api))
}
