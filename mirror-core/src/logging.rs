//! Logging initialization
//!
//! Structured, fire-and-forget tracing; never blocks or fails request
//! handling. `RUST_LOG` overrides the default filter.

use tracing_subscriber::EnvFilter;

pub fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Ignore the error if a subscriber is already installed (tests).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
