//! Exponential-backoff schedules and retry for idempotent GitHub calls.
//!
//! The same [`BackoffConfig`] drives two loops: retrying a single
//! idempotent request that failed transiently ([`retry`]), and polling for
//! an eventually-visible resource (the run correlator).

use std::future::Future;
use std::time::Duration;

use crate::error::GitHubError;

/// Tunable parameters for an exponential-backoff loop.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each attempt.
    pub multiplier: f64,
    /// Total attempts including the first one.
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::correlation()
    }
}

impl BackoffConfig {
    /// Polling schedule for run correlation: 1s, 2s, 4s, 8s between five
    /// attempts, about fifteen seconds in total.
    pub fn correlation() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }

    /// Retry schedule for a single idempotent request.
    pub fn request_retry() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
            multiplier: 2.0,
            max_attempts: 3,
        }
    }

    /// Same shape with every delay at `delay`; handy for tests.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            max_attempts,
        }
    }

    /// Delays slept between consecutive attempts (`max_attempts - 1` items).
    pub fn delays(&self) -> Vec<Duration> {
        let mut delays = Vec::new();
        let mut delay = self.initial_delay.min(self.max_delay);
        for _ in 1..self.max_attempts {
            delays.push(delay);
            delay = next_delay(delay, self);
        }
        delays
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Run `call` until it succeeds, fails with a non-transient error, or the
/// attempt budget is spent.
pub async fn retry<T, F, Fut>(config: &BackoffConfig, call: F) -> Result<T, GitHubError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GitHubError>>,
{
    retry_when(config, GitHubError::is_transient, call).await
}

/// Like [`retry`] but with a caller-supplied predicate deciding which
/// errors are worth another attempt.
///
/// A platform `retry-after` hint replaces the scheduled delay; if the hint
/// exceeds [`BackoffConfig::max_delay`] the error is returned instead of
/// stalling the caller.
pub async fn retry_when<T, F, Fut, P>(
    config: &BackoffConfig,
    should_retry: P,
    mut call: F,
) -> Result<T, GitHubError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GitHubError>>,
    P: Fn(&GitHubError) -> bool,
{
    let mut delay = config.initial_delay.min(config.max_delay);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if attempt >= config.max_attempts || !should_retry(&err) {
            return Err(err);
        }

        let wait = match err.retry_after() {
            Some(hint) if hint > config.max_delay => return Err(err),
            Some(hint) => hint,
            None => delay,
        };

        tracing::warn!(
            operation = %err.operation(),
            attempt,
            delay_ms = wait.as_millis() as u64,
            error = %err,
            "GitHub call failed, retrying",
        );
        tokio::time::sleep(wait).await;
        delay = next_delay(delay, config);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::Operation;

    #[test]
    fn next_delay_doubles() {
        let config = BackoffConfig::correlation();
        let d = next_delay(Duration::from_secs(1), &config);
        assert_eq!(d, Duration::from_secs(2));
    }

    #[test]
    fn next_delay_clamps_at_max() {
        let config = BackoffConfig {
            max_delay: Duration::from_secs(10),
            ..BackoffConfig::correlation()
        };
        let d = next_delay(Duration::from_secs(8), &config);
        assert_eq!(d, Duration::from_secs(10));
    }

    #[test]
    fn correlation_schedule_is_about_fifteen_seconds() {
        let delays = BackoffConfig::correlation().delays();
        let secs: Vec<u64> = delays.iter().map(Duration::as_secs).collect();
        assert_eq!(secs, [1, 2, 4, 8]);
        assert_eq!(delays.iter().sum::<Duration>(), Duration::from_secs(15));
    }

    #[test]
    fn single_attempt_has_no_delays() {
        assert!(BackoffConfig::fixed(Duration::from_millis(1), 1).delays().is_empty());
    }

    fn fast() -> BackoffConfig {
        BackoffConfig::fixed(Duration::from_millis(1), 3)
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry(&fast(), move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(GitHubError::api(Operation::CreateBlob, 502, "bad gateway"))
            } else {
                Ok("sha")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "sha");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry(&fast(), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(GitHubError::api(Operation::CreateTree, 503, "unavailable"))
        })
        .await;
        assert_eq!(result.unwrap_err().status(), Some(503));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry(&fast(), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(GitHubError::api(Operation::UpdateRef, 422, "not a fast forward"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn long_retry_after_is_not_waited_out() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry(&fast(), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(GitHubError::Api {
                operation: Operation::ListRuns,
                status: 429,
                body: "secondary rate limit".into(),
                retry_after: Some(Duration::from_secs(3600)),
                rate_limit_exhausted: false,
            })
        })
        .await;
        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_predicate_retries_not_found() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_when(&fast(), GitHubError::is_not_found, move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(GitHubError::api(Operation::GetBranchRef, 404, "Not Found"))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }
}
