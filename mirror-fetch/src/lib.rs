//! mirror-fetch
//!
//! The two content-fetch tiers (primary credential-replay client and
//! heavy challenge-solver client), the shared credential store, and the
//! fallback coordinator that orders attempts across them.

pub mod coordinator;
pub mod credentials;
pub mod primary;
pub mod solver;

pub use coordinator::{is_block_signal, FallbackCoordinator};
pub use credentials::CredentialStore;
pub use primary::PrimaryClient;
pub use solver::SolverClient;
