use backoff::{backoff::Backoff, Error as BackoffError, ExponentialBackoff};
use std::time::Duration;
use tracing::warn;

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; 0 means fail fast
    pub max_retries: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn is_fail_fast(&self) -> bool {
        self.max_retries == 0
    }

    /// Attempt bounds are enforced by `RetryPolicy`, not by elapsed time.
    pub fn to_exponential_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            multiplier: self.multiplier,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Retry an async operation with exponential backoff, at most
    /// `max_retries` times after the first failure.
    pub async fn retry_async<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let backoff = self.to_exponential_backoff();
        let max_retries = self.max_retries;
        let mut attempt = 0u32;

        let retry_operation = || {
            attempt += 1;
            let current = attempt;
            let fut = operation();
            async move {
                match fut.await {
                    Ok(result) => Ok(result),
                    Err(e) if current > max_retries => Err(BackoffError::permanent(e)),
                    Err(e) => {
                        warn!(
                            "Operation failed (attempt {}/{}), will retry: {}",
                            current,
                            max_retries + 1,
                            e
                        );
                        Err(BackoffError::transient(e))
                    }
                }
            }
        };

        backoff::future::retry(backoff, retry_operation).await
    }

    /// Delay sequence used between manual retries; yields `max_retries` values.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let mut backoff = self.to_exponential_backoff();
        let max_interval = self.max_interval;
        (0..self.max_retries).map(move |_| backoff.next_backoff().unwrap_or(max_interval))
    }
}
