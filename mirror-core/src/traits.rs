//! Core trait definitions
//!
//! The seams between the session layer, the fetch tiers, and the HTTP
//! boundary. Backend implementations live in `mirror-fetch`.

use crate::error::MirrorResult;
use crate::types::{Account, FetchResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

/// A content-fetching tier toward the upstream application.
///
/// Two implementations exist: a primary lightweight credential-replay HTTP
/// client, and a heavy backend able to pass anti-bot challenges. The heavy
/// backend exclusively owns its automation handles; callers only ever see
/// `FetchResult` values.
#[async_trait]
pub trait ContentFetchBackend: Send + Sync {
    /// Prepare per-account state (solver session, seeded credentials).
    async fn open_session(&self, _account: &Account) -> MirrorResult<()> {
        Ok(())
    }

    /// Release per-account state. Must be idempotent.
    async fn close_session(&self, _account_id: &str) -> MirrorResult<()> {
        Ok(())
    }

    async fn fetch_page(&self, account_id: &str, url: &str) -> MirrorResult<FetchResult>;

    async fn fetch_resource(&self, account_id: &str, url: &str) -> MirrorResult<FetchResult>;

    async fn fetch_api(
        &self,
        account_id: &str,
        url: &str,
        method: &str,
        body: Option<Bytes>,
        headers: &HashMap<String, String>,
    ) -> MirrorResult<FetchResult>;
}

/// Backend-session lifecycle as seen by the `SessionManager`.
///
/// The coordinator implements this over both fetch tiers so session
/// creation can single-flight the expensive solver setup.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn open(&self, account: &Account) -> MirrorResult<()>;

    async fn close(&self, account_id: &str) -> MirrorResult<()>;
}
