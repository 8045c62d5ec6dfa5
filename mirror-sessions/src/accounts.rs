//! Account store
//!
//! Keyed lookup of credential blobs and status. Constructed once at process
//! start and passed by reference to the components that need it; the
//! session layer treats accounts as read-only.

use mirror_core::{Account, AccountStatus, MirrorError, MirrorResult};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;

pub struct AccountStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        let map = accounts.into_iter().map(|a| (a.id.clone(), a)).collect();
        Self {
            accounts: RwLock::new(map),
        }
    }

    /// Load a seed file: a JSON array of accounts.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> MirrorResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let accounts: Vec<Account> = serde_json::from_str(&raw)?;
        info!(count = accounts.len(), "loaded account seed file");
        Ok(Self::with_accounts(accounts))
    }

    pub async fn get(&self, account_id: &str) -> Option<Account> {
        self.accounts.read().await.get(account_id).cloned()
    }

    pub async fn insert(&self, account: Account) {
        self.accounts.write().await.insert(account.id.clone(), account);
    }

    /// Check that an account exists, is active, and carries a credential.
    pub async fn validate(&self, account_id: &str) -> MirrorResult<Account> {
        let accounts = self.accounts.read().await;
        let account = accounts
            .get(account_id)
            .ok_or_else(|| MirrorError::not_found(format!("account {account_id}")))?;

        if !account.is_active() {
            return Err(MirrorError::validation_field(
                format!("account {account_id} is not active"),
                "accountId",
            ));
        }
        if account.credential.is_empty() {
            return Err(MirrorError::validation_field(
                format!("account {account_id} has no credential"),
                "accountId",
            ));
        }

        Ok(account.clone())
    }

    pub async fn set_status(
        &self,
        account_id: &str,
        status: AccountStatus,
    ) -> MirrorResult<Account> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(account_id)
            .ok_or_else(|| MirrorError::not_found(format!("account {account_id}")))?;
        account.status = status;
        Ok(account.clone())
    }

    pub async fn remove(&self, account_id: &str) -> Option<Account> {
        self.accounts.write().await.remove(account_id)
    }
}

impl Default for AccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: &str, status: AccountStatus, credential: &str) -> Account {
        Account {
            id: id.to_string(),
            name: None,
            credential: credential.to_string(),
            user_agent: None,
            status,
            last_login: None,
        }
    }

    #[tokio::test]
    async fn validate_active_account() {
        let store =
            AccountStore::with_accounts(vec![account("a1", AccountStatus::Active, "tok=1")]);
        let validated = store.validate("a1").await.unwrap();
        assert_eq!(validated.id, "a1");
    }

    #[tokio::test]
    async fn validate_rejects_unknown_and_inactive() {
        let store = AccountStore::with_accounts(vec![
            account("a1", AccountStatus::Inactive, "tok=1"),
            account("a2", AccountStatus::Active, ""),
        ]);

        assert!(matches!(
            store.validate("missing").await,
            Err(MirrorError::NotFound { .. })
        ));
        assert!(matches!(
            store.validate("a1").await,
            Err(MirrorError::Validation { .. })
        ));
        assert!(matches!(
            store.validate("a2").await,
            Err(MirrorError::Validation { .. })
        ));
    }
}
