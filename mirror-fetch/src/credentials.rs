//! Per-account credential state
//!
//! Cookie jars and user agents shared between the two fetch tiers. The
//! primary client merges upstream `Set-Cookie` headers in; the heavy
//! backend overwrites the jar wholesale from each solver solution.

use mirror_core::Account;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default, Clone)]
struct CredentialEntry {
    cookies: BTreeMap<String, String>,
    user_agent: Option<String>,
}

#[derive(Default)]
pub struct CredentialStore {
    entries: RwLock<HashMap<String, CredentialEntry>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account's jar from its stored credential blob (a cookie
    /// header string).
    pub async fn seed(&self, account: &Account) {
        let entry = CredentialEntry {
            cookies: parse_cookie_header(&account.credential),
            user_agent: account.user_agent.clone(),
        };
        self.entries.write().await.insert(account.id.clone(), entry);
    }

    pub async fn cookie_header(&self, account_id: &str) -> Option<String> {
        let entries = self.entries.read().await;
        let entry = entries.get(account_id)?;
        if entry.cookies.is_empty() {
            return None;
        }
        Some(
            entry
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub async fn user_agent(&self, account_id: &str) -> Option<String> {
        self.entries
            .read()
            .await
            .get(account_id)
            .and_then(|e| e.user_agent.clone())
    }

    /// Merge `Set-Cookie` response header values into the jar. An empty
    /// value deletes the cookie.
    pub async fn merge_set_cookie(&self, account_id: &str, values: &[String]) {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(account_id.to_string()).or_default();
        for raw in values {
            let pair = raw.split(';').next().unwrap_or("").trim();
            if let Some((name, value)) = pair.split_once('=') {
                if value.is_empty() {
                    entry.cookies.remove(name);
                } else {
                    entry.cookies.insert(name.to_string(), value.to_string());
                }
            }
        }
        debug!(account_id, cookies = entry.cookies.len(), "merged set-cookie");
    }

    /// Replace the jar with a solver solution's cookie list.
    pub async fn replace_cookies(
        &self,
        account_id: &str,
        cookies: Vec<(String, String)>,
        user_agent: Option<String>,
    ) {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(account_id.to_string()).or_default();
        entry.cookies = cookies.into_iter().collect();
        if user_agent.is_some() {
            entry.user_agent = user_agent;
        }
    }

    pub async fn clear(&self, account_id: &str) {
        self.entries.write().await.remove(account_id);
    }
}

fn parse_cookie_header(raw: &str) -> BTreeMap<String, String> {
    raw.split(';')
        .filter_map(|part| {
            let (name, value) = part.trim().split_once('=')?;
            if name.is_empty() || value.is_empty() {
                return None;
            }
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_core::AccountStatus;

    fn account(credential: &str) -> Account {
        Account {
            id: "acct-1".to_string(),
            name: None,
            credential: credential.to_string(),
            user_agent: Some("agent/1.0".to_string()),
            status: AccountStatus::Active,
            last_login: None,
        }
    }

    #[tokio::test]
    async fn seed_and_render_cookie_header() {
        let store = CredentialStore::new();
        store.seed(&account("sid=abc; theme=dark")).await;

        let header = store.cookie_header("acct-1").await.unwrap();
        assert_eq!(header, "sid=abc; theme=dark");
        assert_eq!(store.user_agent("acct-1").await.as_deref(), Some("agent/1.0"));
    }

    #[tokio::test]
    async fn set_cookie_merge_updates_and_deletes() {
        let store = CredentialStore::new();
        store.seed(&account("sid=abc; theme=dark")).await;

        store
            .merge_set_cookie(
                "acct-1",
                &[
                    "sid=def; Path=/; HttpOnly".to_string(),
                    "theme=; Max-Age=0".to_string(),
                ],
            )
            .await;

        let header = store.cookie_header("acct-1").await.unwrap();
        assert_eq!(header, "sid=def");
    }

    #[tokio::test]
    async fn replace_overwrites_the_jar() {
        let store = CredentialStore::new();
        store.seed(&account("sid=abc")).await;
        store
            .replace_cookies(
                "acct-1",
                vec![("cf_clearance".to_string(), "xyz".to_string())],
                Some("solver-agent".to_string()),
            )
            .await;

        assert_eq!(
            store.cookie_header("acct-1").await.as_deref(),
            Some("cf_clearance=xyz")
        );
        assert_eq!(
            store.user_agent("acct-1").await.as_deref(),
            Some("solver-agent")
        );
    }
}
