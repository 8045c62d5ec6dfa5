//! Session manager
//!
//! Owns the session table. Creation is single-flighted per
//! (owner, account) pair; expiry is swept periodically; all mutation goes
//! through the table's write lock, which is what makes the sweep and a
//! concurrent validate/renew on the same record mutually exclusive.

use crate::AccountStore;
use chrono::{Duration, Utc};
use mirror_core::{
    MirrorError, MirrorResult, Session, SessionBackend, SessionConfig, SessionState,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

type SessionKey = (String, String);

#[derive(Default)]
struct SessionTable {
    sessions: HashMap<String, Session>,
    /// (owner_id, account_id) -> session id, for the one-active-session
    /// invariant per pair.
    by_key: HashMap<SessionKey, String>,
}

pub struct SessionManager {
    table: RwLock<SessionTable>,
    /// Per-key creation gates; only one caller proceeds to backend-session
    /// creation, the others await and pick up its result.
    create_locks: Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>,
    accounts: Arc<AccountStore>,
    backend: Arc<dyn SessionBackend>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(
        accounts: Arc<AccountStore>,
        backend: Arc<dyn SessionBackend>,
        config: SessionConfig,
    ) -> Self {
        Self {
            table: RwLock::new(SessionTable::default()),
            create_locks: Mutex::new(HashMap::new()),
            accounts,
            backend,
            config,
        }
    }

    fn ttl(&self) -> Duration {
        Duration::seconds(self.config.ttl_secs as i64)
    }

    /// Create a session for (owner, account), or return the existing fresh
    /// one unchanged. Account must be active.
    pub async fn create(&self, owner_id: &str, account_id: &str) -> MirrorResult<Session> {
        if owner_id.is_empty() {
            return Err(MirrorError::auth("missing owner identity"));
        }
        if account_id.is_empty() {
            return Err(MirrorError::validation_field(
                "accountId is required",
                "accountId",
            ));
        }

        let key = (owner_id.to_string(), account_id.to_string());
        let gate = {
            let mut locks = self.create_locks.lock().await;
            locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = gate.lock().await;

        let now = Utc::now();
        {
            let table = self.table.read().await;
            if let Some(id) = table.by_key.get(&key) {
                if let Some(existing) = table.sessions.get(id) {
                    if existing.is_fresh(now) {
                        debug!(session_id = %existing.id, "reusing fresh session");
                        return Ok(existing.clone());
                    }
                }
            }
        }

        let account = self.accounts.validate(account_id).await?;
        self.backend.open(&account).await?;

        let session = Session::new(owner_id, account_id, self.ttl());
        {
            let mut table = self.table.write().await;
            if let Some(old_id) = table.by_key.insert(key, session.id.clone()) {
                // Stale record under this key becomes an expired tombstone.
                if let Some(old) = table.sessions.get_mut(&old_id) {
                    if old.state == SessionState::Active {
                        old.state = SessionState::Expired;
                    }
                }
            }
            table.sessions.insert(session.id.clone(), session.clone());
        }

        info!(session_id = %session.id, owner_id, account_id, "session created");
        Ok(session)
    }

    /// Validate a session id, optionally checking the owner. An overdue
    /// session is expired as a side effect.
    pub async fn validate(
        &self,
        session_id: &str,
        owner_id: Option<&str>,
    ) -> MirrorResult<Session> {
        let now = Utc::now();
        let released_account = {
            let mut table = self.table.write().await;
            let session = match table.sessions.get_mut(session_id) {
                Some(s) => s,
                None => {
                    return Err(MirrorError::not_found(format!("session {session_id}")));
                }
            };

            match session.state {
                SessionState::Expired | SessionState::Destroyed => {
                    return Err(MirrorError::expired_session());
                }
                SessionState::Active => {}
            }

            if let Some(owner) = owner_id {
                if session.owner_id != owner {
                    return Err(MirrorError::auth("session owner mismatch"));
                }
            }

            if !session.is_past_expiry(now) {
                return Ok(session.clone());
            }

            session.state = SessionState::Expired;
            let key = (session.owner_id.clone(), session.account_id.clone());
            let account_id = session.account_id.clone();
            table.by_key.remove(&key);
            let has_other = table
                .sessions
                .values()
                .any(|s| s.account_id == account_id && s.state == SessionState::Active);
            if has_other {
                None
            } else {
                Some(account_id)
            }
        };

        if let Some(account_id) = released_account {
            self.release_backend(&account_id).await;
        }
        Err(MirrorError::expired_session())
    }

    /// Extend the deadline forward from now by the standard TTL. The
    /// deadline never moves backward. No-op on destroyed or unknown ids.
    pub async fn renew(&self, session_id: &str) -> MirrorResult<Option<Session>> {
        let mut table = self.table.write().await;
        if let Some(session) = table.sessions.get_mut(session_id) {
            if session.state == SessionState::Active {
                let candidate = Utc::now() + self.ttl();
                if candidate > session.expires_at {
                    session.expires_at = candidate;
                }
                return Ok(Some(session.clone()));
            }
        }
        Ok(None)
    }

    /// Bump `last_activity`; never moves it backward, and does not extend
    /// the deadline.
    pub async fn update_activity(&self, session_id: &str) {
        let now = Utc::now();
        let mut table = self.table.write().await;
        if let Some(session) = table.sessions.get_mut(session_id) {
            if session.state == SessionState::Active && now > session.last_activity {
                session.last_activity = now;
            }
        }
    }

    pub async fn get(&self, session_id: &str) -> Option<Session> {
        self.table.read().await.sessions.get(session_id).cloned()
    }

    /// Destroy a session. Removing a non-existent session is not an error.
    /// Releases the account's backend handle when this was the last active
    /// session bound to it.
    pub async fn destroy(&self, session_id: &str) -> MirrorResult<()> {
        let released_account = {
            let mut table = self.table.write().await;
            match table.sessions.remove(session_id) {
                Some(session) => {
                    let key = (session.owner_id.clone(), session.account_id.clone());
                    if table.by_key.get(&key) == Some(&session.id) {
                        table.by_key.remove(&key);
                    }
                    let has_other = table
                        .sessions
                        .values()
                        .any(|s| s.account_id == session.account_id && s.state == SessionState::Active);
                    if has_other {
                        None
                    } else {
                        Some(session.account_id)
                    }
                }
                None => None,
            }
        };

        if let Some(account_id) = released_account {
            self.release_backend(&account_id).await;
        }
        info!(session_id, "session destroyed");
        Ok(())
    }

    /// Cascade: destroy every session bound to an account (deactivation or
    /// removal of the account record).
    pub async fn destroy_for_account(&self, account_id: &str) -> usize {
        let removed = {
            let mut table = self.table.write().await;
            let ids: Vec<String> = table
                .sessions
                .values()
                .filter(|s| s.account_id == account_id)
                .map(|s| s.id.clone())
                .collect();
            for id in &ids {
                if let Some(session) = table.sessions.remove(id) {
                    let key = (session.owner_id, session.account_id);
                    table.by_key.remove(&key);
                }
            }
            ids.len()
        };

        if removed > 0 {
            self.release_backend(account_id).await;
            info!(account_id, removed, "cascade-destroyed account sessions");
        }
        removed
    }

    /// One sweep cycle: expire overdue sessions, purge old tombstones,
    /// release backend handles for accounts with nothing active left.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let retention = Duration::seconds(self.config.tombstone_retention_secs as i64);

        let (expired, to_release) = {
            let mut table = self.table.write().await;
            let SessionTable { sessions, by_key } = &mut *table;

            let overdue: Vec<String> = sessions
                .values()
                .filter(|s| s.state == SessionState::Active && s.is_past_expiry(now))
                .map(|s| s.id.clone())
                .collect();

            let mut touched_accounts = HashSet::new();
            for id in &overdue {
                if let Some(session) = sessions.get_mut(id) {
                    session.state = SessionState::Expired;
                    by_key.remove(&(session.owner_id.clone(), session.account_id.clone()));
                    touched_accounts.insert(session.account_id.clone());
                }
            }

            sessions.retain(|_, s| {
                s.state == SessionState::Active || now - s.expires_at <= retention
            });

            let to_release: Vec<String> = touched_accounts
                .into_iter()
                .filter(|account_id| {
                    !sessions
                        .values()
                        .any(|s| &s.account_id == account_id && s.state == SessionState::Active)
                })
                .collect();

            (overdue.len(), to_release)
        };

        for account_id in &to_release {
            self.release_backend(account_id).await;
        }

        // Drop creation gates nobody is holding anymore.
        self.create_locks
            .lock()
            .await
            .retain(|_, gate| Arc::strong_count(gate) > 1);

        if expired > 0 {
            info!(expired, "sweep expired sessions");
        }
        expired
    }

    async fn release_backend(&self, account_id: &str) {
        if let Err(e) = self.backend.close(account_id).await {
            warn!(account_id, error = %e, "failed to release backend handle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mirror_core::{Account, AccountStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingBackend {
        opens: AtomicUsize,
        closes: AtomicUsize,
    }

    impl CountingBackend {
        fn new() -> Self {
            Self {
                opens: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SessionBackend for CountingBackend {
        async fn open(&self, _account: &Account) -> MirrorResult<()> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self, _account_id: &str) -> MirrorResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn account(id: &str) -> Account {
        Account {
            id: id.to_string(),
            name: None,
            credential: "token=abc".to_string(),
            user_agent: None,
            status: AccountStatus::Active,
            last_login: None,
        }
    }

    fn manager_with_ttl(ttl_secs: u64) -> (Arc<SessionManager>, Arc<CountingBackend>) {
        let accounts = Arc::new(AccountStore::with_accounts(vec![
            account("acct-1"),
            account("acct-2"),
        ]));
        let backend = Arc::new(CountingBackend::new());
        let config = SessionConfig {
            ttl_secs,
            sweep_interval_secs: 300,
            tombstone_retention_secs: 3_600,
        };
        let manager = Arc::new(SessionManager::new(accounts, backend.clone(), config));
        (manager, backend)
    }

    #[tokio::test]
    async fn create_returns_existing_fresh_session() {
        let (manager, backend) = manager_with_ttl(3_600);

        let first = manager.create("owner-1", "acct-1").await.unwrap();
        let second = manager.create("owner-1", "acct-1").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_creates_single_flight() {
        let (manager, backend) = manager_with_ttl(3_600);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.create("owner-1", "acct-1").await.unwrap() })
            })
            .collect();

        let sessions: Vec<Session> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let first_id = &sessions[0].id;
        assert!(sessions.iter().all(|s| &s.id == first_id));
        assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validate_checks_owner() {
        let (manager, _) = manager_with_ttl(3_600);
        let session = manager.create("owner-1", "acct-1").await.unwrap();

        assert!(manager.validate(&session.id, Some("owner-1")).await.is_ok());
        let err = manager
            .validate(&session.id, Some("owner-2"))
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::Auth { .. }));
        assert!(!err.is_expired_session());

        // Owner check is optional.
        assert!(manager.validate(&session.id, None).await.is_ok());
    }

    #[tokio::test]
    async fn validate_unknown_session_is_not_found() {
        let (manager, _) = manager_with_ttl(3_600);
        assert!(matches!(
            manager.validate("nope", None).await,
            Err(MirrorError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn sweep_expires_and_validate_reports_expired() {
        let (manager, backend) = manager_with_ttl(0);
        let session = manager.create("owner-1", "acct-1").await.unwrap();

        let expired = manager.sweep().await;
        assert_eq!(expired, 1);
        assert_eq!(backend.closes.load(Ordering::SeqCst), 1);

        let err = manager.validate(&session.id, None).await.unwrap_err();
        assert!(err.is_expired_session());
    }

    #[tokio::test]
    async fn stale_session_is_replaced_on_create() {
        let (manager, backend) = manager_with_ttl(0);
        let first = manager.create("owner-1", "acct-1").await.unwrap();
        let second = manager.create("owner-1", "acct-1").await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(backend.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn renew_never_moves_deadline_backward() {
        let (manager, _) = manager_with_ttl(3_600);
        let session = manager.create("owner-1", "acct-1").await.unwrap();

        let renewed = manager.renew(&session.id).await.unwrap().unwrap();
        assert!(renewed.expires_at >= session.expires_at);

        let again = manager.renew(&session.id).await.unwrap().unwrap();
        assert!(again.expires_at >= renewed.expires_at);

        // Unknown id is a no-op, not an error.
        assert!(manager.renew("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn activity_is_monotonic_and_does_not_extend_deadline() {
        let (manager, _) = manager_with_ttl(3_600);
        let session = manager.create("owner-1", "acct-1").await.unwrap();

        manager.update_activity(&session.id).await;
        let after = manager.get(&session.id).await.unwrap();
        assert!(after.last_activity >= session.last_activity);
        assert_eq!(after.expires_at, session.expires_at);
    }

    #[tokio::test]
    async fn destroy_is_idempotent_and_releases_backend() {
        let (manager, backend) = manager_with_ttl(3_600);
        let session = manager.create("owner-1", "acct-1").await.unwrap();

        manager.destroy(&session.id).await.unwrap();
        manager.destroy(&session.id).await.unwrap();

        assert_eq!(backend.closes.load(Ordering::SeqCst), 1);
        assert!(matches!(
            manager.validate(&session.id, None).await,
            Err(MirrorError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn account_cascade_destroys_all_owners() {
        let (manager, backend) = manager_with_ttl(3_600);
        manager.create("owner-1", "acct-1").await.unwrap();
        manager.create("owner-2", "acct-1").await.unwrap();
        manager.create("owner-1", "acct-2").await.unwrap();

        let removed = manager.destroy_for_account("acct-1").await;
        assert_eq!(removed, 2);
        assert_eq!(backend.closes.load(Ordering::SeqCst), 1);

        // The unrelated account is untouched.
        let other = manager.create("owner-1", "acct-2").await.unwrap();
        assert!(manager.validate(&other.id, None).await.is_ok());
    }
}
