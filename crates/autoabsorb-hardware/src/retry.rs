//! Bounded retry with exponential backoff.
//!
//! [`RetryPolicy::run`] wraps any device channel call. Only
//! [`FailureClass::Transient`] failures are retried; the delay before retry
//! `n` is `base_delay * 2^(n-1)`, capped at `max_delay`. When the attempt
//! budget runs out the last failure is wrapped in
//! [`DeviceError::RetriesExhausted`], which classifies as fatal.
//!
//! # Examples
//!
//! ```
//! use autoabsorb_hardware::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(4)
//!     .with_base_delay(Duration::from_millis(100))
//!     .with_max_delay(Duration::from_millis(250));
//!
//! assert_eq!(policy.delay_for(1), Duration::from_millis(100));
//! assert_eq!(policy.delay_for(2), Duration::from_millis(200));
//! assert_eq!(policy.delay_for(3), Duration::from_millis(250));
//! ```
//!
//! [`FailureClass::Transient`]: crate::error::FailureClass::Transient

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{DeviceError, Result};

/// Retry budget and backoff shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Stop after this many tries (the first call counts).
    pub max_attempts: u32,

    /// Wait before the first retry.
    pub base_delay: Duration,

    /// Backoff ceiling.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Policy with `max_attempts` tries and default delays.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self::new(1)
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails non-transiently, or the attempt
    /// budget is spent.
    ///
    /// `call` is invoked once per attempt and must produce a fresh future
    /// each time.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} recovered on attempt {}", operation, attempt);
                    }
                    return Ok(value);
                }
                Err(error) if error.is_transient() => {
                    if attempt >= max_attempts {
                        warn!(
                            "{} still failing after {} attempts: {}",
                            operation, attempt, error
                        );
                        return Err(DeviceError::RetriesExhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                            last: Box::new(error),
                        });
                    }

                    let delay = self.delay_for(attempt);
                    debug!(
                        "{} attempt {} failed ({}), retrying in {}ms",
                        operation,
                        attempt,
                        error,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
