//! Unified error taxonomy for the mirror pipeline
//!
//! Every component classifies its failures into this one enum so the HTTP
//! boundary can map an error to a status code without re-deriving the cause.

use thiserror::Error;

pub type MirrorResult<T> = Result<T, MirrorError>;

/// Main error type for the mirror system
#[derive(Error, Debug)]
pub enum MirrorError {
    /// Missing or malformed identifiers; the caller fixes its input.
    #[error("validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Invalid or expired session, owner mismatch, or missing auth context.
    #[error("auth error: {message}")]
    Auth { message: String },

    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Anti-bot challenge or 403 persisting after escalation. Terminal but
    /// operator-actionable (credentials likely need refreshing).
    #[error("upstream blocked: {message}")]
    UpstreamBlocked { message: String },

    /// Backend unreachable or timed out after retries. Safe to retry later.
    #[error("upstream unavailable: {message}")]
    UpstreamUnavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("operation timed out: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl MirrorError {
    pub fn validation(message: impl Into<String>) -> Self {
        MirrorError::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        MirrorError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        MirrorError::Auth {
            message: message.into(),
        }
    }

    /// The canonical "session expired" auth error.
    pub fn expired_session() -> Self {
        MirrorError::Auth {
            message: "expired".to_string(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        MirrorError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        MirrorError::UpstreamBlocked {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        MirrorError::UpstreamUnavailable {
            message: message.into(),
            source: None,
        }
    }

    pub fn unavailable_from(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        MirrorError::UpstreamUnavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        MirrorError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Transient errors are eligible for retry with backoff; everything
    /// else propagates immediately with its classification.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MirrorError::Timeout { .. } | MirrorError::UpstreamUnavailable { .. }
        )
    }

    pub fn is_expired_session(&self) -> bool {
        matches!(self, MirrorError::Auth { message } if message == "expired")
    }
}
