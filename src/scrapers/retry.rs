//! Bounded exponential-backoff retry for whole browser operations.
//!
//! A half-completed login or a half-loaded report page is not a state that
//! can be resumed, so retries always re-run the entire operation.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry settings for one class of operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2), 2.0, Duration::from_secs(10))
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one attempt; a multiplier below
    /// 1.0 is treated as 1.0 so delays never shrink.
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: if multiplier.is_finite() && multiplier >= 1.0 {
                multiplier
            } else {
                1.0
            },
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, 1.0, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based):
    /// `base × multiplier^(attempt-1)`, clamped to the maximum.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.powi(exponent);
        let delay_secs = self.base_delay.as_secs_f64() * factor;

        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }

    /// Run `operation` until it succeeds, fails with an error that
    /// `is_retryable` rejects, or the attempt ceiling is reached. The last
    /// error is returned unchanged.
    ///
    /// The operation receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut, R>(
        &self,
        label: &str,
        is_retryable: R,
        mut operation: F,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            debug!("{}: attempt {}/{}", label, attempt, self.max_attempts);

            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && is_retryable(&e) => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        "{}: attempt {}/{} failed: {}; retrying in {:?}",
                        label, attempt, self.max_attempts, e, delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if attempt >= self.max_attempts && self.max_attempts > 1 {
                        warn!("{}: giving up after {} attempts: {}", label, attempt, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
