//! Retry policy for batch chunks.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error};

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with the specified max attempts.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Retries back to back, without waiting.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            jitter: false,
            ..Default::default()
        }
    }

    /// Calculates the delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Up to 25% either way.
            let factor = rand::thread_rng().gen_range(0.75..=1.25);
            Duration::from_secs_f64(delay * factor)
        } else {
            Duration::from_secs_f64(delay)
        }
    }

    /// Runs `f` until it succeeds or `max_attempts` is reached, returning the
    /// last error in the latter case.
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        error!("Giving up after {} attempts: {}", attempt, e);
                        return Err(e);
                    }

                    let delay = self.delay_for_attempt(attempt);
                    error!("Attempt {} failed, retrying in {:?}: {}", attempt, delay, e);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    debug!("Retry attempt {}", attempt + 1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_retry_success() {
        let policy = RetryPolicy::with_max_attempts(3);
        let result: Result<i32, &str> = policy.execute(|| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_eventual_success() {
        let policy = RetryPolicy::with_max_attempts(3);
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<i32, &str> = policy
            .execute(|| {
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("not yet")
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_counts_exact_attempts() {
        let policy = RetryPolicy::immediate(3);
        let attempts = AtomicU32::new(0);

        let result: Result<i32, String> = policy
            .execute(|| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("failure {}", attempt)) }
            })
            .await;

        assert_eq!(result.unwrap_err(), "failure 2");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delay_growth_is_capped() {
        let policy = RetryPolicy {
            jitter: false,
            ..Default::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(5));
        assert_eq!(RetryPolicy::immediate(3).delay_for_attempt(2), Duration::ZERO);
    }
}
