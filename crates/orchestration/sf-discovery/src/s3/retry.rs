//! Exponential backoff with jitter.
//!
//! [`RetryConfig`] wraps individual store calls with [`with_retry`];
//! [`ExponentialBackoff`] is the application-level [`Backoff`] policy the
//! queue poller consults between failed receive calls.

use rand::Rng;
use sf_error::{classify_error, ErrorCategory, Result};
use sf_traits::Backoff;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retries before giving up.
    pub max_retries: u32,
    /// Initial backoff duration in milliseconds.
    pub initial_backoff_ms: u64,
    /// Maximum backoff duration in milliseconds.
    pub max_backoff_ms: u64,
    /// Whether to add jitter to backoff times.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_backoff_ms(mut self, initial_backoff_ms: u64) -> Self {
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    pub fn with_max_backoff_ms(mut self, max_backoff_ms: u64) -> Self {
        self.max_backoff_ms = max_backoff_ms;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the backoff duration for a given attempt (0-based).
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let base_ms = 2u64
            .checked_pow(attempt)
            .and_then(|factor| self.initial_backoff_ms.checked_mul(factor))
            .unwrap_or(u64::MAX);
        let capped_ms = base_ms.min(self.max_backoff_ms);

        let final_ms = if self.jitter {
            let jitter_range = capped_ms / 4; // 25% jitter
            let jitter = rand::rng().random_range(0..=jitter_range);
            capped_ms.saturating_add(jitter)
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms)
    }
}

/// Execute a store call, retrying transient failures.
///
/// Only errors classified as [`ErrorCategory::Transient`] are retried;
/// missing objects, access errors and lease errors return immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation_name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if classify_error(&e) != ErrorCategory::Transient || attempt >= config.max_retries {
                    return Err(e);
                }

                let backoff = config.backoff_duration(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %e,
                    backoff_ms = backoff.as_millis() as u64,
                    "Retryable error, backing off"
                );
                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

/// Exponential [`Backoff`] bounded by a number of attempts.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    delays: RetryConfig,
    max_attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, maximum: Duration) -> Self {
        Self {
            delays: RetryConfig::new()
                .with_initial_backoff_ms(initial.as_millis() as u64)
                .with_max_backoff_ms(maximum.as_millis() as u64),
            max_attempts: u32::MAX,
        }
    }

    /// Policy used between failed queue receives: 20 s doubling up to
    /// 5 minutes, with jitter, without an attempt limit.
    pub fn for_queue_polling() -> Self {
        Self::new(Duration::from_secs(20), Duration::from_secs(5 * 60))
    }

    /// Attempt number at which the policy reports exhaustion.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.delays.jitter = jitter;
        self
    }
}

impl Backoff for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        Some(self.delays.backoff_duration(attempt.saturating_sub(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sf_error::{SfError, StoreError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff_ms, 100);
        assert_eq!(config.max_backoff_ms, 10_000);
        assert!(config.jitter);
    }

    #[test]
    fn test_backoff_duration_no_jitter() {
        let config = RetryConfig::new()
            .with_initial_backoff_ms(100)
            .with_max_backoff_ms(10_000)
            .with_jitter(false);

        assert_eq!(config.backoff_duration(0), Duration::from_millis(100));
        assert_eq!(config.backoff_duration(1), Duration::from_millis(200));
        assert_eq!(config.backoff_duration(3), Duration::from_millis(800));
        assert_eq!(config.backoff_duration(200), Duration::from_millis(10_000));
    }

    #[test]
    fn test_backoff_duration_jitter_bounded() {
        let config = RetryConfig::new()
            .with_initial_backoff_ms(1000)
            .with_max_backoff_ms(1000);
        for _ in 0..20 {
            let delay = config.backoff_duration(0);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_exponential_backoff_exhaustion() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(10), Duration::from_secs(1))
            .with_jitter(false)
            .with_max_attempts(3);

        assert_eq!(backoff.next_delay(1), Some(Duration::from_millis(10)));
        assert_eq!(backoff.next_delay(2), Some(Duration::from_millis(20)));
        assert_eq!(backoff.next_delay(3), None);
    }

    #[test]
    fn test_queue_polling_backoff() {
        let backoff = ExponentialBackoff::for_queue_polling().with_jitter(false);
        assert_eq!(backoff.next_delay(1), Some(Duration::from_secs(20)));
        assert_eq!(backoff.next_delay(100), Some(Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn test_with_retry_success_after_retry() {
        let config = RetryConfig::new().with_initial_backoff_ms(1).with_jitter(false);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<i32> = with_retry(&config, "list", || {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(StoreError::List("SlowDown".to_string()).into())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_not_found_is_immediate() {
        let config = RetryConfig::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = with_retry(&config, "head", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(SfError::no_such_key("b", "k")) }
        })
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up() {
        let config = RetryConfig::new()
            .with_max_retries(2)
            .with_initial_backoff_ms(1)
            .with_jitter(false);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = with_retry(&config, "get", || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::Get("timeout".to_string()).into()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
