//! Heavy fetch tier
//!
//! HTTP client for a challenge-solver service speaking the FlareSolverr
//! JSON command protocol (`sessions.create`, `request.get`, `request.post`,
//! `sessions.destroy`). One solver session is held per account; each
//! solution's cookie list overwrites the shared credential jar so the
//! primary tier can replay the refreshed cookies.

use crate::credentials::CredentialStore;
use async_trait::async_trait;
use bytes::Bytes;
use mirror_core::{
    Account, ContentFetchBackend, FetchResult, MirrorError, MirrorResult, SolverConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SolverCommand<'a> {
    cmd: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    post_data: Option<&'a str>,
}

impl<'a> SolverCommand<'a> {
    fn bare(cmd: &'a str) -> Self {
        Self {
            cmd,
            session: None,
            url: None,
            max_timeout: None,
            post_data: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolverResponse {
    status: String,
    #[serde(default)]
    message: String,
    solution: Option<SolverSolution>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SolverSolution {
    url: String,
    status: u16,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    response: String,
    #[serde(default)]
    cookies: Vec<SolverCookie>,
    #[serde(default)]
    user_agent: Option<String>,
}

#[derive(Deserialize)]
struct SolverCookie {
    name: String,
    value: String,
}

pub struct SolverClient {
    client: reqwest::Client,
    config: SolverConfig,
    credentials: Arc<CredentialStore>,
    /// account id -> solver session name.
    sessions: RwLock<HashMap<String, String>>,
}

impl SolverClient {
    pub fn new(config: SolverConfig, credentials: Arc<CredentialStore>) -> MirrorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| MirrorError::internal(format!("failed to build solver client: {e}")))?;

        Ok(Self {
            client,
            config,
            credentials,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    async fn send(&self, command: &SolverCommand<'_>) -> MirrorResult<SolverResponse> {
        let response = self
            .client
            .post(&self.config.url)
            .json(command)
            .send()
            .await
            .map_err(|e| self.classify(e, command.cmd))?;

        let parsed: SolverResponse = response
            .json()
            .await
            .map_err(|e| self.classify(e, command.cmd))?;

        if parsed.status != "ok" {
            return Err(MirrorError::unavailable(format!(
                "solver rejected {}: {}",
                command.cmd, parsed.message
            )));
        }
        Ok(parsed)
    }

    fn classify(&self, error: reqwest::Error, operation: &str) -> MirrorError {
        if error.is_timeout() {
            MirrorError::Timeout {
                operation: format!("solver {operation}"),
                duration_ms: self.config.request_timeout_secs * 1_000,
            }
        } else {
            MirrorError::unavailable_from(format!("solver {operation} failed"), error)
        }
    }

    /// The solver answers `sessions.list` only when it is up and ready.
    pub async fn health_check(&self) -> MirrorResult<()> {
        self.send(&SolverCommand::bare("sessions.list")).await?;
        Ok(())
    }

    async fn request(
        &self,
        account_id: &str,
        url: &str,
        post_data: Option<&str>,
    ) -> MirrorResult<FetchResult> {
        let session = self.sessions.read().await.get(account_id).cloned();
        let cmd = if post_data.is_some() {
            "request.post"
        } else {
            "request.get"
        };
        let command = SolverCommand {
            cmd,
            session: session.as_deref(),
            url: Some(url),
            max_timeout: Some(self.config.max_page_timeout_ms),
            post_data,
        };

        let response = self.send(&command).await?;
        let solution = response.solution.ok_or_else(|| {
            MirrorError::unavailable(format!("solver returned no solution for {url}"))
        })?;

        let cookies: Vec<(String, String)> = solution
            .cookies
            .into_iter()
            .map(|c| (c.name, c.value))
            .collect();
        self.credentials
            .replace_cookies(account_id, cookies, solution.user_agent)
            .await;

        let headers: HashMap<String, String> = solution
            .headers
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();

        debug!(account_id, url, status = solution.status, "solver fetch complete");
        Ok(FetchResult {
            status_code: solution.status,
            body: Bytes::from(solution.response),
            headers,
            final_url: solution.url,
            degraded: false,
        })
    }

    fn session_name(account_id: &str) -> String {
        format!("mirror-{account_id}")
    }
}

#[async_trait]
impl ContentFetchBackend for SolverClient {
    async fn open_session(&self, account: &Account) -> MirrorResult<()> {
        if self.sessions.read().await.contains_key(&account.id) {
            return Ok(());
        }
        self.health_check().await?;

        let name = Self::session_name(&account.id);
        let command = SolverCommand {
            session: Some(&name),
            ..SolverCommand::bare("sessions.create")
        };
        self.send(&command).await?;

        self.credentials.seed(account).await;
        self.sessions
            .write()
            .await
            .insert(account.id.clone(), name.clone());
        info!(account_id = %account.id, session = %name, "solver session opened");
        Ok(())
    }

    async fn close_session(&self, account_id: &str) -> MirrorResult<()> {
        let Some(name) = self.sessions.write().await.remove(account_id) else {
            return Ok(());
        };
        let command = SolverCommand {
            session: Some(&name),
            ..SolverCommand::bare("sessions.destroy")
        };
        // Releasing is best-effort: the solver reaps dead sessions itself.
        if let Err(e) = self.send(&command).await {
            warn!(account_id, error = %e, "failed to destroy solver session");
        }
        Ok(())
    }

    async fn fetch_page(&self, account_id: &str, url: &str) -> MirrorResult<FetchResult> {
        self.request(account_id, url, None).await
    }

    async fn fetch_resource(&self, account_id: &str, url: &str) -> MirrorResult<FetchResult> {
        self.request(account_id, url, None).await
    }

    async fn fetch_api(
        &self,
        account_id: &str,
        url: &str,
        method: &str,
        body: Option<Bytes>,
        _headers: &HashMap<String, String>,
    ) -> MirrorResult<FetchResult> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => self.request(account_id, url, None).await,
            "POST" => {
                let data = body
                    .as_deref()
                    .map(|b| String::from_utf8_lossy(b).into_owned())
                    .unwrap_or_default();
                self.request(account_id, url, Some(&data)).await
            }
            other => Err(MirrorError::validation(format!(
                "solver backend supports GET and POST only, got {other}"
            ))),
        }
    }
}
