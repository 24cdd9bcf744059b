// Shared HTTP plumbing for the upstream data sources.
//
// Every upstream call goes through `with_backoff`: HTTP 429 sleeps and
// retries with a doubling delay up to the attempt budget, any other failure
// gives up at once. Giving up yields `None` ("unavailable"), never an error,
// so callers skip the unit of work and carry on.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use courtside_core::config::RetryConfig;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limited by upstream (HTTP 429)")]
    RateLimited,

    #[error("upstream returned HTTP {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Bounded exponential backoff for rate-limit responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
        }
    }
}

/// Run `op` under `policy`. Returns `None` once the attempt budget is spent
/// on rate limits, or on the first non-rate-limit failure.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let mut delay = policy.initial_backoff;
    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(value) => return Some(value),
            Err(FetchError::RateLimited) => {
                if attempt == policy.max_attempts {
                    break;
                }
                warn!(
                    request = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => {
                warn!(request = label, error = %e, "request failed, source unavailable");
                return None;
            }
        }
    }
    warn!(
        request = label,
        attempts = policy.max_attempts,
        "retry budget exhausted, source unavailable"
    );
    None
}

/// HTTP client with a per-request timeout. A timed-out request surfaces as a
/// `FetchError::Request` and therefore as "unavailable".
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("failed to build http client")
}

/// GET `url` with `query` and decode the JSON body.
pub async fn get_json(client: &Client, url: &str, query: &[(&str, String)]) -> Result<Value, FetchError> {
    debug!(url, "GET");
    let response = client
        .get(url)
        .query(query)
        .header("accept", "application/json")
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited);
    }
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    Ok(response.json::<Value>().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_secs(30),
        }
    }

    #[test]
    fn policy_from_config() {
        let p = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 5,
            initial_backoff_ms: 30_000,
        });
        assert_eq!(p, policy(5));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_first_try_without_sleeping() {
        let start = Instant::now();
        let result = with_backoff(&policy(5), "test", || async { Ok::<_, FetchError>(7) }).await;
        assert_eq!(result, Some(7));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_then_success_doubles_delay() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result = with_backoff(&policy(5), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FetchError::RateLimited)
                } else {
                    Ok("payload")
                }
            }
        })
        .await;

        assert_eq!(result, Some("payload"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 30s + 60s
        assert_eq!(start.elapsed(), Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_is_unavailable() {
        let calls = AtomicU32::new(0);
        let result: Option<()> = with_backoff(&policy(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::RateLimited) }
        })
        .await;

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn other_failures_give_up_immediately() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();
        let result: Option<()> = with_backoff(&policy(5), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::Status(500)) }
        })
        .await;

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
