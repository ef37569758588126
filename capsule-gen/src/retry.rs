//! Retry policy shared by the HTTP collaborators (LLM, speech, scraping).

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f32,
    /// HTTP statuses worth another attempt
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            retryable_statuses: vec![429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    pub fn retries_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Delay before attempt `attempt + 1`, where `attempt` counts from 1.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0).powi(attempt.saturating_sub(1) as i32);
        let ms = (self.initial_delay_ms as f32 * factor).min(self.max_delay_ms as f32);
        Duration::from_millis(ms as u64)
    }
}

/// Errors that can tell whether another attempt may succeed.
pub trait Retryable {
    fn is_retryable(&self, policy: &RetryPolicy) -> bool;

    /// Server-requested wait, overriding the backoff schedule.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for llm_client::LlmError {
    fn is_retryable(&self, policy: &RetryPolicy) -> bool {
        use llm_client::LlmError;
        match self {
            LlmError::RateLimited { .. } => policy.retries_status(429),
            LlmError::ServerOverloaded { status, .. } => policy.retries_status(*status),
            LlmError::ApiError {
                status_code: Some(status),
                ..
            } => policy.retries_status(*status),
            other => LlmError::is_retryable(other),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            llm_client::LlmError::RateLimited {
                retry_after: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. The last error is returned.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= max_attempts || !e.is_retryable(policy) {
                    return Err(e);
                }

                let delay = e
                    .retry_after()
                    .map(|d| d.min(Duration::from_millis(policy.max_delay_ms)))
                    .unwrap_or_else(|| policy.delay_after(attempt));
                log::warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    what,
                    attempt,
                    max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct StatusError(u16);

    impl Display for StatusError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "HTTP {}", self.0)
        }
    }

    impl Retryable for StatusError {
        fn is_retryable(&self, policy: &RetryPolicy) -> bool {
            policy.retries_status(self.0)
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay_ms: 1,
            max_delay_ms: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(10), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Cell::new(0);
        let result: Result<&str, StatusError> = with_retry(&fast_policy(), "fetch", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(StatusError(503))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), StatusError> = with_retry(&fast_policy(), "fetch", || {
            calls.set(calls.get() + 1);
            async { Err(StatusError(429)) }
        })
        .await;
        assert_eq!(result.unwrap_err().0, 429);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), StatusError> = with_retry(&fast_policy(), "fetch", || {
            calls.set(calls.get() + 1);
            async { Err(StatusError(404)) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_llm_errors_follow_policy() {
        use llm_client::LlmError;
        let policy = RetryPolicy::default();
        let retryable = |e: LlmError| Retryable::is_retryable(&e, &policy);

        assert!(retryable(LlmError::RateLimited { retry_after: None }));
        assert!(retryable(LlmError::ServerOverloaded {
            status: 503,
            message: String::new()
        }));
        assert!(!retryable(LlmError::ApiError {
            message: "bad request".into(),
            status_code: Some(400)
        }));
        assert!(retryable(LlmError::ApiError {
            message: "connection reset".into(),
            status_code: None
        }));
        assert!(!retryable(LlmError::MissingApiKey {
            provider: "Gemini".into(),
            env_var: "GOOGLE_API_KEY".into()
        }));
    }

    #[test]
    fn test_rate_limit_retry_after() {
        let err = llm_client::LlmError::RateLimited { retry_after: Some(7) };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }
}
