//! mirror-web
//!
//! The HTTP boundary of the mirror pipeline: router, handlers, request
//! identity extraction, and the server binary glue.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use server::MirrorServer;
pub use state::AppState;

use axum::http::header::{HeaderName, CONTENT_TYPE};
use axum::Router;
use mirror_core::MirrorError;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the main application router.
pub fn create_app(state: AppState) -> Router {
    // Permissive CORS scoped to the proxy's own identity headers; the
    // rewritten pages run on arbitrary client origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            CONTENT_TYPE,
            HeaderName::from_static("x-owner-id"),
            HeaderName::from_static("x-mirror-account-id"),
            HeaderName::from_static("x-mirror-session-id"),
        ]);

    Router::new()
        .merge(routes::routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Configuration for the web server itself; the pipeline configuration
/// lives in `mirror_core::MirrorConfig`.
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    /// JSON array of seed accounts loaded at startup.
    pub accounts_file: Option<String>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            accounts_file: None,
        }
    }
}

impl WebConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("MIRROR_HOST").unwrap_or(defaults.host),
            port: std::env::var("MIRROR_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            accounts_file: std::env::var("MIRROR_ACCOUNTS_FILE").ok(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Error types for server startup; per-request errors go through
/// `error::ApiError` instead.
#[derive(thiserror::Error, Debug)]
pub enum WebError {
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] MirrorError),
}

pub type WebResult<T> = Result<T, WebError>;

/// Initialize logging for the web server.
pub fn init_logging() {
    mirror_core::init_logging(
        "mirror_web=debug,mirror_sessions=debug,mirror_fetch=debug,tower_http=debug",
    );
}
