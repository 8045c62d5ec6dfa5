//! mirror-sessions
//!
//! Account store and session lifecycle: single-flighted creation, owner
//! validation, renewal, activity tracking, destruction, and the periodic
//! expiry sweep.

pub mod accounts;
pub mod manager;

pub use accounts::AccountStore;
pub use manager::SessionManager;
