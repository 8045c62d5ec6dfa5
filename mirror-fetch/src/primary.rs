//! Primary fetch tier
//!
//! Lightweight credential-replay HTTP client: sends the account's cookie
//! jar and user agent with every request and folds upstream `Set-Cookie`
//! headers back into the jar. Cheap, but cannot pass a fresh anti-bot
//! challenge; blocked responses are returned as-is for the coordinator to
//! classify.

use crate::credentials::CredentialStore;
use async_trait::async_trait;
use bytes::Bytes;
use mirror_core::{Account, ContentFetchBackend, FetchConfig, FetchResult, MirrorError, MirrorResult};
use reqwest::header;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct PrimaryClient {
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
    timeout: Duration,
}

impl PrimaryClient {
    pub fn new(config: &FetchConfig, credentials: Arc<CredentialStore>) -> MirrorResult<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| MirrorError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            credentials,
            timeout,
        })
    }

    async fn execute(
        &self,
        account_id: &str,
        method: reqwest::Method,
        url: &str,
        body: Option<Bytes>,
        extra_headers: &HashMap<String, String>,
    ) -> MirrorResult<FetchResult> {
        let mut request = self.client.request(method, url);

        if let Some(cookie) = self.credentials.cookie_header(account_id).await {
            request = request.header(header::COOKIE, cookie);
        }
        let user_agent = self
            .credentials
            .user_agent(account_id)
            .await
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        request = request.header(header::USER_AGENT, user_agent);

        for (name, value) in extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify(e, url, self.timeout))?;

        let set_cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_string))
            .collect();
        if !set_cookies.is_empty() {
            self.credentials.merge_set_cookie(account_id, &set_cookies).await;
        }

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            // The jar already absorbed cookies; never relay them downstream.
            if name == &header::SET_COOKIE {
                continue;
            }
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| classify(e, url, self.timeout))?;

        debug!(account_id, url, status_code, "primary fetch complete");
        Ok(FetchResult {
            status_code,
            body,
            headers,
            final_url,
            degraded: false,
        })
    }
}

fn classify(error: reqwest::Error, url: &str, timeout: Duration) -> MirrorError {
    if error.is_timeout() {
        MirrorError::Timeout {
            operation: format!("fetch {url}"),
            duration_ms: timeout.as_millis() as u64,
        }
    } else {
        MirrorError::unavailable_from(format!("request to {url} failed"), error)
    }
}

#[async_trait]
impl ContentFetchBackend for PrimaryClient {
    async fn open_session(&self, account: &Account) -> MirrorResult<()> {
        self.credentials.seed(account).await;
        Ok(())
    }

    async fn close_session(&self, account_id: &str) -> MirrorResult<()> {
        self.credentials.clear(account_id).await;
        Ok(())
    }

    async fn fetch_page(&self, account_id: &str, url: &str) -> MirrorResult<FetchResult> {
        self.execute(account_id, reqwest::Method::GET, url, None, &HashMap::new())
            .await
    }

    async fn fetch_resource(&self, account_id: &str, url: &str) -> MirrorResult<FetchResult> {
        self.execute(account_id, reqwest::Method::GET, url, None, &HashMap::new())
            .await
    }

    async fn fetch_api(
        &self,
        account_id: &str,
        url: &str,
        method: &str,
        body: Option<Bytes>,
        headers: &HashMap<String, String>,
    ) -> MirrorResult<FetchResult> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| MirrorError::validation(format!("unsupported method {method}")))?;
        self.execute(account_id, method, url, body, headers).await
    }
}
