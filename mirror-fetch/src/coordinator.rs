//! Fallback coordinator
//!
//! Orders attempts across the two fetch tiers. Pages go straight to the
//! heavy backend (challenges expected); resources and API calls try the
//! primary tier first and escalate once on a block signal. Transient
//! failures are retried with capped exponential backoff, independent of the
//! escalation path. Heavy-backend access is serialized per account because
//! the underlying automation handle is not safe for concurrent use.

use async_trait::async_trait;
use bytes::Bytes;
use mirror_core::{
    Account, ContentFetchBackend, FetchConfig, FetchResult, MirrorError, MirrorResult,
    SessionBackend,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Substrings that mark an anti-bot challenge page regardless of status.
const CHALLENGE_MARKERS: &[&str] = &[
    "just a moment",
    "challenge-platform",
    "__cf_chl",
    "attention required",
];

/// Classify a response as a block signal: 403/429, a challenge mitigation
/// header, or a challenge marker in a textual body. This is the single
/// input to escalation decisions.
pub fn is_block_signal(result: &FetchResult) -> bool {
    if result.status_code == 403 || result.status_code == 429 {
        return true;
    }
    if result.header("cf-mitigated").is_some() {
        return true;
    }
    if result.is_textual() {
        let body = result.text().to_lowercase();
        return CHALLENGE_MARKERS.iter().any(|m| body.contains(m));
    }
    false
}

pub struct FallbackCoordinator {
    primary: Arc<dyn ContentFetchBackend>,
    heavy: Arc<dyn ContentFetchBackend>,
    config: FetchConfig,
    /// Per-account exclusivity locks for the heavy backend.
    heavy_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FallbackCoordinator {
    pub fn new(
        primary: Arc<dyn ContentFetchBackend>,
        heavy: Arc<dyn ContentFetchBackend>,
        config: FetchConfig,
    ) -> Self {
        Self {
            primary,
            heavy,
            config,
            heavy_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn account_lock(&self, account_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.heavy_locks.lock().await;
        locks
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Retry transient failures with doubling backoff, capped. Terminal
    /// errors propagate immediately.
    async fn with_retries<F, Fut>(&self, operation: &str, mut call: F) -> MirrorResult<FetchResult>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MirrorResult<FetchResult>>,
    {
        let cap = Duration::from_millis(self.config.backoff_cap_ms);
        let mut backoff = Duration::from_millis(self.config.backoff_base_ms);
        let mut attempt = 0u32;
        loop {
            match call().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() && attempt < self.config.max_transient_retries => {
                    attempt += 1;
                    warn!(
                        operation,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(cap);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Refresh the account's cookies through the heavy backend. The
    /// exclusivity lock is held only for the duration of the call and is
    /// released before any error propagates.
    async fn escalate(&self, account_id: &str, url: &str) -> MirrorResult<()> {
        let lock = self.account_lock(account_id).await;
        let _guard = lock.lock().await;

        warn!(account_id, url, "block signal, escalating to heavy backend");
        let result = self
            .with_retries("heavy refresh", || self.heavy.fetch_page(account_id, url))
            .await?;

        if is_block_signal(&result) {
            return Err(MirrorError::blocked(format!(
                "heavy backend blocked at {url} (status {})",
                result.status_code
            )));
        }
        Ok(())
    }

    /// Page-level fetch: always the heavy backend, serialized per account.
    pub async fn fetch_page(&self, account_id: &str, url: &str) -> MirrorResult<FetchResult> {
        let lock = self.account_lock(account_id).await;
        let _guard = lock.lock().await;

        let result = self
            .with_retries("heavy fetch_page", || self.heavy.fetch_page(account_id, url))
            .await?;
        if is_block_signal(&result) {
            return Err(MirrorError::blocked(format!(
                "page fetch blocked at {url} (status {})",
                result.status_code
            )));
        }
        Ok(result)
    }

    pub async fn fetch_resource(&self, account_id: &str, url: &str) -> MirrorResult<FetchResult> {
        let first = self
            .with_retries("primary fetch_resource", || {
                self.primary.fetch_resource(account_id, url)
            })
            .await?;
        if !is_block_signal(&first) {
            return Ok(first);
        }

        self.escalate(account_id, url).await?;

        // Exactly one post-escalation retry of the primary tier.
        let mut retry = self
            .with_retries("primary fetch_resource (post-escalation)", || {
                self.primary.fetch_resource(account_id, url)
            })
            .await?;
        if is_block_signal(&retry) {
            return Err(MirrorError::blocked(format!(
                "resource fetch still blocked after escalation: {url} (status {})",
                retry.status_code
            )));
        }
        debug!(account_id, url, "resource served after escalation");
        retry.degraded = true;
        Ok(retry)
    }

    pub async fn fetch_api(
        &self,
        account_id: &str,
        url: &str,
        method: &str,
        body: Option<Bytes>,
        headers: &HashMap<String, String>,
    ) -> MirrorResult<FetchResult> {
        let first = self
            .with_retries("primary fetch_api", || {
                self.primary
                    .fetch_api(account_id, url, method, body.clone(), headers)
            })
            .await?;
        if !is_block_signal(&first) {
            return Ok(first);
        }

        self.escalate(account_id, url).await?;

        let mut retry = self
            .with_retries("primary fetch_api (post-escalation)", || {
                self.primary
                    .fetch_api(account_id, url, method, body.clone(), headers)
            })
            .await?;
        if is_block_signal(&retry) {
            return Err(MirrorError::blocked(format!(
                "api call still blocked after escalation: {url} (status {})",
                retry.status_code
            )));
        }
        retry.degraded = true;
        Ok(retry)
    }
}

#[async_trait]
impl SessionBackend for FallbackCoordinator {
    async fn open(&self, account: &Account) -> MirrorResult<()> {
        let lock = self.account_lock(&account.id).await;
        let _guard = lock.lock().await;

        self.heavy.open_session(account).await?;
        self.primary.open_session(account).await
    }

    async fn close(&self, account_id: &str) -> MirrorResult<()> {
        let lock = self.account_lock(account_id).await;
        let _guard = lock.lock().await;

        self.heavy.close_session(account_id).await?;
        self.primary.close_session(account_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockBackend {
        responses: Mutex<VecDeque<MirrorResult<FetchResult>>>,
        calls: AtomicUsize,
    }

    impl MockBackend {
        fn with(responses: Vec<MirrorResult<FetchResult>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn next(&self) -> MirrorResult<FetchResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Err(MirrorError::internal("mock exhausted")))
        }
    }

    #[async_trait]
    impl ContentFetchBackend for MockBackend {
        async fn fetch_page(&self, _account_id: &str, _url: &str) -> MirrorResult<FetchResult> {
            self.next().await
        }

        async fn fetch_resource(&self, _account_id: &str, _url: &str) -> MirrorResult<FetchResult> {
            self.next().await
        }

        async fn fetch_api(
            &self,
            _account_id: &str,
            _url: &str,
            _method: &str,
            _body: Option<Bytes>,
            _headers: &HashMap<String, String>,
        ) -> MirrorResult<FetchResult> {
            self.next().await
        }
    }

    fn response(status: u16) -> FetchResult {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/html".to_string());
        FetchResult {
            status_code: status,
            body: Bytes::from_static(b"<html>ok</html>"),
            headers,
            final_url: "https://app.example.com/x".to_string(),
            degraded: false,
        }
    }

    fn fast_config() -> FetchConfig {
        FetchConfig {
            request_timeout_secs: 30,
            max_transient_retries: 3,
            backoff_base_ms: 1,
            backoff_cap_ms: 4,
        }
    }

    fn coordinator(
        primary: Arc<MockBackend>,
        heavy: Arc<MockBackend>,
    ) -> FallbackCoordinator {
        FallbackCoordinator::new(primary, heavy, fast_config())
    }

    #[tokio::test]
    async fn resource_escalates_once_and_recovers() {
        let primary = MockBackend::with(vec![Ok(response(403)), Ok(response(200))]);
        let heavy = MockBackend::with(vec![Ok(response(200))]);
        let coordinator = coordinator(primary.clone(), heavy.clone());

        let result = coordinator
            .fetch_resource("acct-1", "https://app.example.com/a.css")
            .await
            .unwrap();

        assert_eq!(result.status_code, 200);
        assert!(result.degraded);
        assert_eq!(heavy.calls(), 1);
        assert_eq!(primary.calls(), 2);
    }

    #[tokio::test]
    async fn persistent_block_surfaces_upstream_blocked() {
        let primary = MockBackend::with(vec![Ok(response(403)), Ok(response(403))]);
        let heavy = MockBackend::with(vec![Ok(response(200))]);
        let coordinator = coordinator(primary.clone(), heavy.clone());

        let err = coordinator
            .fetch_resource("acct-1", "https://app.example.com/a.css")
            .await
            .unwrap_err();

        assert!(matches!(err, MirrorError::UpstreamBlocked { .. }));
        assert_eq!(heavy.calls(), 1);
    }

    #[tokio::test]
    async fn blocked_heavy_backend_short_circuits() {
        let primary = MockBackend::with(vec![Ok(response(403))]);
        let heavy = MockBackend::with(vec![Ok(response(403))]);
        let coordinator = coordinator(primary.clone(), heavy.clone());

        let err = coordinator
            .fetch_resource("acct-1", "https://app.example.com/a.css")
            .await
            .unwrap_err();

        assert!(matches!(err, MirrorError::UpstreamBlocked { .. }));
        // No post-escalation retry once the heavy tier is blocked too.
        assert_eq!(primary.calls(), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let primary = MockBackend::with(vec![
            Err(MirrorError::unavailable("connect refused")),
            Err(MirrorError::unavailable("connect refused")),
            Ok(response(200)),
        ]);
        let heavy = MockBackend::with(vec![]);
        let coordinator = coordinator(primary.clone(), heavy.clone());

        let result = coordinator
            .fetch_resource("acct-1", "https://app.example.com/a.css")
            .await
            .unwrap();

        assert_eq!(result.status_code, 200);
        assert!(!result.degraded);
        assert_eq!(primary.calls(), 3);
        assert_eq!(heavy.calls(), 0);
    }

    #[tokio::test]
    async fn transient_exhaustion_surfaces_unavailable() {
        let failures: Vec<MirrorResult<FetchResult>> = (0..4)
            .map(|_| Err(MirrorError::unavailable("connect refused")))
            .collect();
        let primary = MockBackend::with(failures);
        let heavy = MockBackend::with(vec![]);
        let coordinator = coordinator(primary.clone(), heavy.clone());

        let err = coordinator
            .fetch_resource("acct-1", "https://app.example.com/a.css")
            .await
            .unwrap_err();

        assert!(matches!(err, MirrorError::UpstreamUnavailable { .. }));
        // Initial attempt plus max_transient_retries.
        assert_eq!(primary.calls(), 4);
    }

    #[tokio::test]
    async fn page_fetch_uses_heavy_only() {
        let primary = MockBackend::with(vec![]);
        let heavy = MockBackend::with(vec![Ok(response(200))]);
        let coordinator = coordinator(primary.clone(), heavy.clone());

        let result = coordinator
            .fetch_page("acct-1", "https://app.example.com/")
            .await
            .unwrap();

        assert_eq!(result.status_code, 200);
        assert_eq!(primary.calls(), 0);
        assert_eq!(heavy.calls(), 1);
    }

    #[tokio::test]
    async fn challenge_marker_in_body_is_a_block_signal() {
        let mut blocked = response(200);
        blocked.body = Bytes::from_static(b"<title>Just a moment...</title>");
        assert!(is_block_signal(&blocked));

        let mut binary = response(200);
        binary.headers.insert(
            "content-type".to_string(),
            "application/octet-stream".to_string(),
        );
        binary.body = Bytes::from_static(b"just a moment");
        assert!(!is_block_signal(&binary));
    }

    #[tokio::test]
    async fn api_calls_follow_the_same_policy() {
        let primary = MockBackend::with(vec![Ok(response(429)), Ok(response(200))]);
        let heavy = MockBackend::with(vec![Ok(response(200))]);
        let coordinator = coordinator(primary.clone(), heavy.clone());

        let result = coordinator
            .fetch_api(
                "acct-1",
                "https://app.example.com/api/jobs",
                "POST",
                Some(Bytes::from_static(b"{}")),
                &HashMap::new(),
            )
            .await
            .unwrap();

        assert_eq!(result.status_code, 200);
        assert!(result.degraded);
        assert_eq!(heavy.calls(), 1);
    }
}
