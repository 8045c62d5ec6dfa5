//! mirror-core
//!
//! Shared types, configuration, error taxonomy, and the backend trait seams
//! for the mirror pipeline.

pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use config::{FetchConfig, MirrorConfig, SessionConfig, SolverConfig, UpstreamConfig};
pub use error::{MirrorError, MirrorResult};
pub use logging::init_logging;
pub use traits::{ContentFetchBackend, SessionBackend};
pub use types::{Account, AccountStatus, FetchResult, RewriteContext, Session, SessionState};
