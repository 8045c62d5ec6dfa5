//! Configuration for the mirror pipeline
//!
//! Loaded from environment variables with defaults; the web binary layers
//! CLI overrides on top.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub upstream: UpstreamConfig,
    pub solver: SolverConfig,
    pub fetch: FetchConfig,
    pub session: SessionConfig,
}

/// The single third-party application being mirrored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Fully-qualified base URL, no trailing slash.
    pub base_url: String,
    /// Path prefix under which the upstream serves its API.
    pub api_prefix: String,
}

/// Challenge-solver service (the heavy backend).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    pub url: String,
    /// Outer HTTP timeout toward the solver service.
    pub request_timeout_secs: u64,
    /// Budget the solver itself gets to pass a challenge.
    pub max_page_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub request_timeout_secs: u64,
    pub max_transient_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// How long expired tombstones stay observable before purging.
    pub tombstone_retention_secs: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig {
                base_url: "https://app.example.com".to_string(),
                api_prefix: "/api".to_string(),
            },
            solver: SolverConfig {
                url: "http://localhost:8191/v1".to_string(),
                request_timeout_secs: 70,
                max_page_timeout_ms: 60_000,
            },
            fetch: FetchConfig {
                request_timeout_secs: 30,
                max_transient_retries: 3,
                backoff_base_ms: 2_000,
                backoff_cap_ms: 8_000,
            },
            session: SessionConfig {
                ttl_secs: 3_600,
                sweep_interval_secs: 300,
                tombstone_retention_secs: 3_600,
            },
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl MirrorConfig {
    /// Load configuration from environment variables, falling back to the
    /// defaults above for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            upstream: UpstreamConfig {
                base_url: std::env::var("MIRROR_UPSTREAM_URL")
                    .unwrap_or(defaults.upstream.base_url)
                    .trim_end_matches('/')
                    .to_string(),
                api_prefix: std::env::var("MIRROR_UPSTREAM_API_PREFIX")
                    .unwrap_or(defaults.upstream.api_prefix),
            },
            solver: SolverConfig {
                url: std::env::var("MIRROR_SOLVER_URL").unwrap_or(defaults.solver.url),
                request_timeout_secs: env_or(
                    "MIRROR_SOLVER_TIMEOUT_SECS",
                    defaults.solver.request_timeout_secs,
                ),
                max_page_timeout_ms: env_or(
                    "MIRROR_SOLVER_PAGE_TIMEOUT_MS",
                    defaults.solver.max_page_timeout_ms,
                ),
            },
            fetch: FetchConfig {
                request_timeout_secs: env_or(
                    "MIRROR_FETCH_TIMEOUT_SECS",
                    defaults.fetch.request_timeout_secs,
                ),
                max_transient_retries: env_or(
                    "MIRROR_FETCH_RETRIES",
                    defaults.fetch.max_transient_retries,
                ),
                backoff_base_ms: env_or("MIRROR_BACKOFF_BASE_MS", defaults.fetch.backoff_base_ms),
                backoff_cap_ms: env_or("MIRROR_BACKOFF_CAP_MS", defaults.fetch.backoff_cap_ms),
            },
            session: SessionConfig {
                ttl_secs: env_or("MIRROR_SESSION_TTL_SECS", defaults.session.ttl_secs),
                sweep_interval_secs: env_or(
                    "MIRROR_SWEEP_INTERVAL_SECS",
                    defaults.session.sweep_interval_secs,
                ),
                tombstone_retention_secs: env_or(
                    "MIRROR_TOMBSTONE_RETENTION_SECS",
                    defaults.session.tombstone_retention_secs,
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = MirrorConfig::default();
        assert_eq!(config.fetch.max_transient_retries, 3);
        assert_eq!(config.fetch.backoff_base_ms, 2_000);
        assert_eq!(config.session.ttl_secs, 3_600);
        assert!(!config.upstream.base_url.ends_with('/'));
    }
}
