//! Linear backoff retry loop shared by every provider call.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use tracing::warn;

use crate::config::RetryPolicy;

/// Waits `unit * n` before the n-th retry.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    unit: Duration,
    retries: u32,
}

impl LinearBackoff {
    pub fn new(unit: Duration) -> Self {
        Self { unit, retries: 0 }
    }

    pub fn from_policy(policy: &RetryPolicy) -> Self {
        Self::new(Duration::from_millis(policy.backoff_unit_ms()))
    }
}

impl Backoff for LinearBackoff {
    fn next_backoff(&mut self) -> Option<Duration> {
        self.retries = self.retries.saturating_add(1);
        self.unit.checked_mul(self.retries)
    }

    fn reset(&mut self) {
        self.retries = 0;
    }
}

/// Every attempt failed; carries the last error.
#[derive(Debug)]
pub struct RetriesExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Retry an async operation under `policy`.
///
/// `attempt` receives the 1-based attempt number and is called up to
/// `policy.attempts()` times. Between failures the task sleeps
/// `backoff_ms * attempt`. `label` only appears in logs.
pub async fn retry_with_backoff<T, E, Fut, F>(
    policy: &RetryPolicy,
    label: &str,
    mut attempt: F,
) -> Result<T, RetriesExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let max_attempts = policy.attempts();
    let mut backoff = LinearBackoff::from_policy(policy);
    let mut number = 0;

    loop {
        number += 1;

        match attempt(number).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(
                    "{}: attempt {}/{} failed: {}",
                    label, number, max_attempts, e
                );

                if number >= max_attempts {
                    return Err(RetriesExhausted {
                        attempts: number,
                        last_error: e,
                    });
                }

                if let Some(wait_duration) = backoff.next_backoff() {
                    tokio::time::sleep(wait_duration).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn linear_backoff_grows_by_unit() {
        let mut backoff = LinearBackoff::new(Duration::from_millis(250));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(250)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(500)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(750)));
        backoff.reset();
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn from_policy_applies_floor() {
        let mut backoff = LinearBackoff::from_policy(&RetryPolicy::new(3, 10));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_first_attempt() {
        let result: Result<&str, RetriesExhausted<String>> =
            retry_with_backoff(&RetryPolicy::new(3, 100), "test", |_| async { Ok("ok") }).await;
        assert_eq!(result.unwrap(), "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_with_linear_sleeps() {
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let start = tokio::time::Instant::now();

        let result: Result<(), RetriesExhausted<String>> =
            retry_with_backoff(&RetryPolicy::new(4, 200), "test", move |n| {
                let c = count_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(format!("fail {}", n))
                }
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 4);
        assert_eq!(exhausted.last_error, "fail 4");
        assert_eq!(count.load(Ordering::SeqCst), 4);
        // 200 + 400 + 600
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1200));
        assert!(elapsed < Duration::from_millis(1300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();

        let result: Result<&str, RetriesExhausted<String>> =
            retry_with_backoff(&RetryPolicy::new(3, 100), "test", move |_| {
                let c = count_clone.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok("recovered")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "recovered");
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_tries_once() {
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();

        let result: Result<(), RetriesExhausted<String>> =
            retry_with_backoff(&RetryPolicy::new(0, 0), "test", move |_| {
                let c = count_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("nope".to_string())
                }
            })
            .await;

        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
