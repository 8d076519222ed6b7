//! Retry policy for transaction submission

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a failed submission attempt is classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The sequence number was already used; retry at once with the next one
    SequenceConflict,
    /// Anything else; retry after a backoff
    Transient,
}

/// When to give up on a submission and how long to wait between attempts
///
/// # Example
/// ```
/// use options_sim_core::submit::{FailureClass, RetryPolicy};
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.backoff(1, FailureClass::SequenceConflict), Duration::ZERO);
/// assert!(policy.backoff(3, FailureClass::Transient) > policy.backoff(1, FailureClass::Transient));
/// assert!(RetryPolicy::unbounded().should_retry(1_000_000, Duration::from_secs(86_400)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first; `None` means no cap
    pub max_attempts: Option<u32>,
    /// Give up once this much time has passed since the first attempt
    pub max_elapsed_ms: Option<u64>,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Some(8),
            max_elapsed_ms: Some(30_000),
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Retry forever
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            max_elapsed_ms: None,
            ..Self::default()
        }
    }

    /// Retry immediately, at most `max_attempts` times in total
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            max_elapsed_ms: None,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1.0,
        }
    }

    /// Whether another attempt is allowed after `attempts` failed ones
    pub fn should_retry(&self, attempts: u32, elapsed: Duration) -> bool {
        if self.max_attempts.is_some_and(|max| attempts >= max) {
            return false;
        }
        if self
            .max_elapsed_ms
            .is_some_and(|max| elapsed >= Duration::from_millis(max))
        {
            return false;
        }
        true
    }

    /// Delay before the attempt following failed attempt number `attempt`
    pub fn backoff(&self, attempt: u32, class: FailureClass) -> Duration {
        if class == FailureClass::SequenceConflict {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial_backoff_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        Duration::from_millis(millis.min(self.max_backoff_ms as f64) as u64)
    }
}
