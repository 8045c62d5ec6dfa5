//! Shared application state
//!
//! Constructed once at startup and cloned into every handler. Owns the
//! account store, session manager, fallback coordinator, and rewrite
//! engine; handlers never reach into their internals directly.

use crate::{WebConfig, WebError, WebResult};
use mirror_core::{AccountStatus, ContentFetchBackend, MirrorConfig, MirrorResult};
use mirror_fetch::{CredentialStore, FallbackCoordinator, PrimaryClient, SolverClient};
use mirror_rewrite::RewriteEngine;
use mirror_sessions::{AccountStore, SessionManager};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<MirrorConfig>,
    pub accounts: Arc<AccountStore>,
    pub sessions: Arc<SessionManager>,
    pub coordinator: Arc<FallbackCoordinator>,
    pub rewriter: Arc<RewriteEngine>,
    started_at: Instant,
}

impl AppState {
    /// Wire up the production backends: primary credential-replay client
    /// and the heavy challenge-solver client sharing one credential store.
    pub async fn new(config: MirrorConfig, web: &WebConfig) -> WebResult<Self> {
        let accounts = match &web.accounts_file {
            Some(path) => {
                let store = AccountStore::from_json_file(path)
                    .map_err(|e| WebError::Config(format!("accounts file {path}: {e}")))?;
                info!(path = %path, "account store seeded from file");
                Arc::new(store)
            }
            None => Arc::new(AccountStore::new()),
        };

        let credentials = Arc::new(CredentialStore::new());
        let primary = Arc::new(PrimaryClient::new(&config.fetch, credentials.clone())?);
        let heavy = Arc::new(SolverClient::new(config.solver.clone(), credentials)?);

        Ok(Self::with_backends(config, accounts, primary, heavy)?)
    }

    /// Assemble state over arbitrary fetch backends. Tests substitute mocks
    /// here; production goes through [`AppState::new`].
    pub fn with_backends(
        config: MirrorConfig,
        accounts: Arc<AccountStore>,
        primary: Arc<dyn ContentFetchBackend>,
        heavy: Arc<dyn ContentFetchBackend>,
    ) -> MirrorResult<Self> {
        let coordinator = Arc::new(FallbackCoordinator::new(
            primary,
            heavy,
            config.fetch.clone(),
        ));
        let sessions = Arc::new(SessionManager::new(
            accounts.clone(),
            coordinator.clone(),
            config.session.clone(),
        ));
        let rewriter = Arc::new(RewriteEngine::new()?);

        Ok(Self {
            config: Arc::new(config),
            accounts,
            sessions,
            coordinator,
            rewriter,
            started_at: Instant::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Deactivate an account and cascade-destroy every session bound to it.
    pub async fn deactivate_account(&self, account_id: &str) -> MirrorResult<usize> {
        self.accounts
            .set_status(account_id, AccountStatus::Inactive)
            .await?;
        Ok(self.sessions.destroy_for_account(account_id).await)
    }

    /// Remove an account record entirely, with the same cascade.
    pub async fn remove_account(&self, account_id: &str) -> usize {
        self.accounts.remove(account_id).await;
        self.sessions.destroy_for_account(account_id).await
    }
}
