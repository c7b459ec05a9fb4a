//! Backoff policy shared by enumeration and nonce-conflict resubmission.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Exponential backoff capped at `max_delay`. `base_delay == max_delay` gives a
/// fixed interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self::new(max_attempts, delay, delay)
    }

    /// Delay to wait after the `attempt`-th failure (0-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31) as u32);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Runs `op` until it succeeds or `max_attempts` is reached, sleeping between
    /// attempts. Returns the last error on exhaustion.
    pub async fn retry_async<F, Fut, T, E>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(val) => return Ok(val),
                Err(err) => {
                    attempt += 1;
                    log::warn!(
                        "{what}: attempt {attempt}/{} failed: {err}",
                        self.max_attempts
                    );
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    sleep(self.delay_for(attempt - 1)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn new_clamps_attempts_and_max_delay() {
        let policy = RetryPolicy::new(0, Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.max_delay, Duration::from_secs(2));
    }

    #[test]
    fn fixed_policy_never_grows() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(5));
        for attempt in 0..5 {
            assert_eq!(policy.delay_for(attempt), Duration::from_secs(5));
        }
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryPolicy::new(6, Duration::from_secs(1), Duration::from_secs(16));
        let delays: Vec<_> = (0..7).map(|a| policy.delay_for(a).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 16, 16]);
        assert_eq!(policy.delay_for(usize::MAX), Duration::from_secs(16));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_async_retries_until_success() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(5));
        let calls = AtomicUsize::new(0);
        let started = tokio::time::Instant::now();
        let result: Result<&str, String> = policy
            .retry_async("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(format!("boom {attempt}"))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_async_stops_after_max_attempts() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(5));
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = policy
            .retry_async("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("nope".to_string()) }
            })
            .await;
        assert_eq!(result, Err("nope".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
