//! HTTP client retry utilities for service-to-service communication.
//!
//! Retries transient failures with exponential backoff and jitter, bounded
//! both by an attempt count and by an optional overall deadline. The deadline
//! covers every attempt and every backoff sleep: no attempt is started, and
//! no sleep is scheduled, that would finish past it.

use backoff::ExponentialBackoffBuilder;
use backoff::backoff::Backoff;
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep, timeout};
use tracing::{info, warn};

/// Configuration for retry behavior.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Initial backoff duration before first retry.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Jitter as a fraction of the current interval (0.0 disables jitter).
    pub randomization_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            backoff_multiplier: 2.0,
            randomization_factor: 0.25,
        }
    }
}

impl RetryConfig {
    /// Create a config with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    fn policy(&self) -> impl Backoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_multiplier(self.backoff_multiplier)
            .with_randomization_factor(self.randomization_factor)
            // Elapsed time is tracked against the tokio clock below.
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Classifies an error as worth retrying.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Whether an HTTP status indicates a transient upstream condition.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Terminal outcome of a retried call.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The last attempt failed and no further attempt was allowed.
    #[error("{error} (after {attempts} attempt(s))")]
    Failed { error: E, attempts: u32 },

    /// The overall deadline elapsed.
    #[error("deadline of {deadline:?} exceeded after {attempts} attempt(s)")]
    DeadlineExceeded { deadline: Duration, attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Failed { attempts, .. } | RetryError::DeadlineExceeded { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Execute an HTTP call with retry logic.
///
/// `f` is invoked once per attempt. Errors for which
/// [`Transient::is_transient`] returns false are returned immediately.
///
/// # Example
/// ```ignore
/// let licenses = retry_http_call(
///     &RetryConfig::default(),
///     "fetch_account_licenses",
///     Some(Duration::from_secs(5)),
///     || async { client.fetch_once(account_id).await },
/// ).await;
/// ```
pub async fn retry_http_call<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    deadline: Option<Duration>,
    f: F,
) -> Result<T, RetryError<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Transient + std::fmt::Display,
{
    let started = Instant::now();
    let mut policy = config.policy();
    let mut attempts = 0;

    loop {
        attempts += 1;

        let outcome = match deadline {
            Some(limit) => {
                let remaining = limit.saturating_sub(started.elapsed());
                match timeout(remaining, f()).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(
                            operation = operation_name,
                            attempt = attempts,
                            deadline_ms = limit.as_millis() as u64,
                            "HTTP call exceeded deadline"
                        );
                        return Err(RetryError::DeadlineExceeded {
                            deadline: limit,
                            attempts,
                        });
                    }
                }
            }
            None => f().await,
        };

        let error = match outcome {
            Ok(result) => {
                if attempts > 1 {
                    info!(
                        operation = operation_name,
                        attempt = attempts,
                        "HTTP call succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => error,
        };

        if !error.is_transient() {
            warn!(
                operation = operation_name,
                error = %error,
                "HTTP call failed with permanent error, not retrying"
            );
            return Err(RetryError::Failed { error, attempts });
        }

        if attempts > config.max_retries {
            warn!(
                operation = operation_name,
                attempt = attempts,
                error = %error,
                "HTTP call failed after max retries"
            );
            return Err(RetryError::Failed { error, attempts });
        }

        let Some(backoff) = policy.next_backoff() else {
            return Err(RetryError::Failed { error, attempts });
        };

        if let Some(limit) = deadline
            && started.elapsed() + backoff >= limit
        {
            warn!(
                operation = operation_name,
                attempt = attempts,
                error = %error,
                "Backoff would exceed deadline, giving up"
            );
            return Err(RetryError::Failed { error, attempts });
        }

        warn!(
            operation = operation_name,
            attempt = attempts,
            error = %error,
            backoff_ms = backoff.as_millis() as u64,
            "HTTP call failed, retrying after backoff"
        );

        sleep(backoff).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        transient: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (transient={})", self.transient)
        }
    }

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    fn quick() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            backoff_multiplier: 2.0,
            randomization_factor: 0.0,
        }
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_first_attempt() {
        let result = retry_http_call(&quick(), "test_op", None, || async {
            Ok::<_, TestError>(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_http_call(&quick(), "test_op", None, || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError { transient: true })
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_failure_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_http_call(&quick(), "test_op", None, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError { transient: false })
            }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Failed { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = retry_http_call(&quick(), "test_op", None, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError { transient: true })
            }
        })
        .await;

        assert_eq!(result.unwrap_err().attempts(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cuts_slow_attempt() {
        let started = Instant::now();
        let result = retry_http_call(
            &quick(),
            "test_op",
            Some(Duration::from_millis(500)),
            || async {
                sleep(Duration::from_secs(30)).await;
                Ok::<_, TestError>(1)
            },
        )
        .await;

        assert!(matches!(
            result,
            Err(RetryError::DeadlineExceeded { attempts: 1, .. })
        ));
        assert!(started.elapsed() <= Duration::from_millis(501));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_never_sleeps_past_deadline() {
        let config = RetryConfig {
            max_retries: 10,
            initial_backoff: Duration::from_millis(400),
            max_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            randomization_factor: 0.0,
        };
        let started = Instant::now();
        let result = retry_http_call(
            &config,
            "test_op",
            Some(Duration::from_millis(1000)),
            || async { Err::<i32, _>(TestError { transient: true }) },
        )
        .await;

        // 400ms then 800ms would cross the 1s deadline, so only one sleep.
        assert!(matches!(result, Err(RetryError::Failed { attempts: 2, .. })));
        assert!(started.elapsed() < Duration::from_millis(1000));
    }
}
