//! Retry logic with exponential backoff
//!
//! Transient network failures inside a single transfer are retried here
//! before the item is declared failed. Once an item reaches the failed state
//! nothing restarts it automatically; the caller decides whether to `start`
//! it again.
//!
//! # Example
//!
//! ```no_run
//! use episode_dl::retry::{IsRetryable, retry_with_backoff};
//! use episode_dl::config::RetryConfig;
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Transient,
//!     Permanent,
//! }
//!
//! impl std::fmt::Display for MyError {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "{:?}", self)
//!     }
//! }
//!
//! impl IsRetryable for MyError {
//!     fn is_retryable(&self) -> bool {
//!         matches!(self, MyError::Transient)
//!     }
//! }
//!
//! # async fn example() -> Result<(), MyError> {
//! let config = RetryConfig::default();
//! retry_with_backoff(&config, || async {
//!     Ok::<_, MyError>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{Error, TransferError};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, refused or reset connections, overloaded
/// servers) return `true`. Permanent failures (missing file, disk full)
/// return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for TransferError {
    fn is_retryable(&self) -> bool {
        match self {
            TransferError::Network { .. } => true,
            // Request timeout, rate limiting, and server-side errors
            TransferError::HttpStatus { status } => {
                matches!(status, 408 | 429) || ((500..=599).contains(status) && *status != 501)
            }
            TransferError::Disk { .. }
            | TransferError::InsufficientSpace { .. }
            | TransferError::ResumeUnsupported
            | TransferError::PauseTimeout
            | TransferError::Incomplete { .. } => false,
        }
    }
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Transfer(e) => e.is_retryable(),
            Error::Config { .. }
            | Error::Database(_)
            | Error::Sqlx(_)
            | Error::Serialization(_)
            | Error::InvalidUrl(_)
            | Error::InvalidResumeToken(_)
            | Error::ShuttingDown
            | Error::Other(_) => false,
        }
    }
}

/// Exponential backoff schedule bounded by [`RetryConfig`]
///
/// Each call to [`next_delay`](Backoff::next_delay) consumes one attempt.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    attempt: u32,
    delay: Duration,
}

impl Backoff {
    /// Start a fresh schedule
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            config: config.clone(),
            attempt: 0,
            delay: config.initial_delay,
        }
    }

    /// Number of retries consumed so far
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next retry, or `None` once the budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        self.attempt += 1;

        let current = self.delay;
        let next = Duration::from_secs_f64(current.as_secs_f64() * self.config.backoff_multiplier);
        self.delay = next.min(self.config.max_delay);

        Some(if self.config.jitter {
            add_jitter(current)
        } else {
            current
        })
    }
}

/// Execute an async operation, retrying transient failures with backoff
///
/// Returns the successful result or the last error after the retry budget is
/// exhausted. Non-retryable errors are returned immediately.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut backoff = Backoff::new(config);

    loop {
        match operation().await {
            Ok(result) => {
                if backoff.attempts() > 0 {
                    tracing::info!(
                        attempts = backoff.attempts() + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() => match backoff.next_delay() {
                Some(delay) => {
                    tracing::warn!(
                        error = %e,
                        attempt = backoff.attempts(),
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis(),
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!(
                        error = %e,
                        attempts = backoff.attempts() + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                    return Err(e);
                }
            },
            Err(e) => {
                tracing::debug!(error = %e, "Operation failed with non-retryable error");
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// The result lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[tokio::test]
    async fn success_needs_no_retry() {
        let counter = Arc::new(AtomicU32::new(0));
        let calls = counter.clone();

        let result = retry_with_backoff(&fast_config(3), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TransferError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let calls = counter.clone();

        let result = retry_with_backoff(&fast_config(3), || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(TransferError::network("connection reset"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let counter = Arc::new(AtomicU32::new(0));
        let calls = counter.clone();

        let result = retry_with_backoff(&fast_config(2), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TransferError::HttpStatus { status: 503 })
            }
        })
        .await;

        assert_eq!(result.unwrap_err(), TransferError::HttpStatus { status: 503 });
        // initial attempt + 2 retries
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let calls = counter.clone();

        let result = retry_with_backoff(&fast_config(5), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TransferError::HttpStatus { status: 404 })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_fails_on_first_transient_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let calls = counter.clone();

        let result = retry_with_backoff(&fast_config(0), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TransferError::network("timeout"))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_grows_exponentially_and_is_capped() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        let mut backoff = Backoff::new(&config);

        let delays: Vec<_> = std::iter::from_fn(|| backoff.next_delay()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
                Duration::from_millis(300),
                Duration::from_millis(300),
            ]
        );
        assert_eq!(backoff.attempts(), 5);
        assert!(backoff.next_delay().is_none());
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let delay = Duration::from_millis(100);
        for _ in 0..1000 {
            let jittered = add_jitter(delay);
            assert!(jittered >= delay);
            assert!(jittered <= delay * 2);
        }
    }

    #[test]
    fn transfer_error_classification() {
        assert!(TransferError::network("reset").is_retryable());
        assert!(TransferError::HttpStatus { status: 503 }.is_retryable());
        assert!(TransferError::HttpStatus { status: 429 }.is_retryable());
        assert!(TransferError::HttpStatus { status: 408 }.is_retryable());
        assert!(!TransferError::HttpStatus { status: 501 }.is_retryable());
        assert!(!TransferError::HttpStatus { status: 404 }.is_retryable());
        assert!(!TransferError::disk("full").is_retryable());
        assert!(!TransferError::ResumeUnsupported.is_retryable());
        assert!(
            !TransferError::Incomplete {
                expected: 2,
                received: 1
            }
            .is_retryable()
        );
    }

    #[test]
    fn crate_error_classification() {
        let reset: Error = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into();
        assert!(reset.is_retryable());

        let denied: Error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(!denied.is_retryable());

        assert!(Error::Transfer(TransferError::network("x")).is_retryable());
        assert!(!Error::ShuttingDown.is_retryable());
        assert!(!Error::InvalidUrl("x".into()).is_retryable());
    }
}
