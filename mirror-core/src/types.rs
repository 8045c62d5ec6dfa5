//! Core data type definitions

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One upstream identity: a stored credential blob plus status.
///
/// Owned by the `AccountStore`; read-only to the rest of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: Option<String>,
    /// Opaque credential blob (cookie header string for the upstream).
    pub credential: String,
    pub user_agent: Option<String>,
    pub status: AccountStatus,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// A time-bounded binding between a caller (owner) and one account.
///
/// Owned exclusively by the `SessionManager`; every other component refers
/// to it by id and never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub owner_id: String,
    pub account_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: SessionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Expired,
    Destroyed,
}

impl Session {
    pub fn new(owner_id: &str, account_id: &str, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            account_id: account_id.to_string(),
            created_at: now,
            last_activity: now,
            expires_at: now + ttl,
            state: SessionState::Active,
        }
    }

    /// Active and not past its deadline; fresh sessions are reused by
    /// `create` instead of opening a duplicate backend session.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.state == SessionState::Active && now < self.expires_at
    }

    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of a backend fetch, in whatever tier ended up serving it.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status_code: u16,
    pub body: Bytes,
    /// Response headers with lowercased names.
    pub headers: HashMap<String, String>,
    pub final_url: String,
    /// True when the heavy backend was used as a fallback, for observability.
    pub degraded: bool,
}

impl FetchResult {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_css(&self) -> bool {
        self.content_type()
            .map(|ct| ct.contains("text/css"))
            .unwrap_or(false)
    }

    pub fn is_textual(&self) -> bool {
        self.content_type()
            .map(|ct| {
                ct.starts_with("text/")
                    || ct.contains("json")
                    || ct.contains("javascript")
                    || ct.contains("xml")
            })
            .unwrap_or(false)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Per-request rewriting context. Ephemeral; never persisted.
#[derive(Debug, Clone)]
pub struct RewriteContext {
    pub account_id: String,
    pub session_id: String,
    pub base_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_freshness() {
        let session = Session::new("owner-1", "acct-1", Duration::seconds(3600));
        let now = Utc::now();
        assert!(session.is_fresh(now));
        assert!(session.is_past_expiry(now + Duration::seconds(3601)));

        let mut expired = session.clone();
        expired.state = SessionState::Expired;
        assert!(!expired.is_fresh(now));
    }

    #[test]
    fn fetch_result_headers() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/css".to_string());
        let result = FetchResult {
            status_code: 200,
            body: Bytes::from_static(b"body { color: red }"),
            headers,
            final_url: "https://app.example.com/a.css".to_string(),
            degraded: false,
        };
        assert_eq!(result.header("Content-Type"), Some("text/css"));
        assert!(result.is_css());
        assert!(result.is_textual());
    }
}
