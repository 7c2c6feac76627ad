//! Retry, activity and workflow options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ActivityError;

/// Retry policy applied by the engine to activities and workflow runs.
///
/// The delay before attempt `n + 1` is
/// `min(initial_interval * backoff_coefficient^(n - 1), maximum_interval)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Multiplier applied to the delay after every failed attempt
    pub backoff_coefficient: f64,
    /// Upper bound on the delay (default: 100x the initial interval)
    pub maximum_interval: Option<Duration>,
    /// Total attempts including the first one (0 = unlimited)
    pub maximum_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            maximum_interval: None,
            maximum_attempts: 0,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    pub fn no_retries() -> Self {
        Self::default().maximum_attempts(1)
    }

    pub fn initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient;
        self
    }

    pub fn maximum_interval(mut self, interval: Duration) -> Self {
        self.maximum_interval = Some(interval);
        self
    }

    pub fn maximum_attempts(mut self, attempts: u32) -> Self {
        self.maximum_attempts = attempts;
        self
    }

    /// Whether another attempt is allowed after `attempt` attempts have run.
    pub fn allows_attempt_after(&self, attempt: u32) -> bool {
        self.maximum_attempts == 0 || attempt < self.maximum_attempts
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let cap = self
            .maximum_interval
            .unwrap_or_else(|| self.initial_interval.saturating_mul(100));
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_coefficient.max(1.0).powi(exponent);
        let secs = self.initial_interval.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= cap.as_secs_f64() {
            cap
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Backoff before the next attempt, or `None` when the failure is final.
    pub fn next_backoff(&self, attempt: u32, error: &ActivityError) -> Option<Duration> {
        if !error.is_retryable() || !self.allows_attempt_after(attempt) {
            return None;
        }
        Some(self.backoff(attempt))
    }
}

/// Per-activity scheduling options, fixed when the workflow is authored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityOptions {
    /// Maximum duration of a single attempt
    pub start_to_close_timeout: Duration,
    /// Task queue override (default: the workflow's task queue)
    pub task_queue: Option<String>,
    /// Retry policy override (default: the engine's default policy)
    pub retry_policy: Option<RetryPolicy>,
}

impl ActivityOptions {
    pub fn new(start_to_close_timeout: Duration) -> Self {
        Self {
            start_to_close_timeout,
            task_queue: None,
            retry_policy: None,
        }
    }

    pub fn task_queue(mut self, queue: impl Into<String>) -> Self {
        self.task_queue = Some(queue.into());
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}

/// Options used when submitting a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOptions {
    /// Business identifier shared by all attempts (generated when absent)
    pub workflow_id: Option<String>,
    /// Task queue the workflow task is routed to
    pub task_queue: String,
    /// Workflow-level retry policy (default: a single attempt)
    pub retry_policy: Option<RetryPolicy>,
}

impl WorkflowOptions {
    pub fn new(task_queue: impl Into<String>) -> Self {
        Self {
            workflow_id: None,
            task_queue: task_queue.into(),
            retry_policy: None,
        }
    }

    pub fn workflow_id(mut self, id: impl Into<String>) -> Self {
        self.workflow_id = Some(id.into());
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_non_decreasing_and_capped() {
        let policy = RetryPolicy::new()
            .initial_interval(Duration::from_secs(30))
            .maximum_attempts(5);

        let delays: Vec<Duration> = (1..=6).map(|a| policy.backoff(a)).collect();
        assert_eq!(delays[0], Duration::from_secs(30));
        assert_eq!(delays[1], Duration::from_secs(60));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(3000)));
    }

    #[test]
    fn test_constant_backoff() {
        let policy = RetryPolicy::new()
            .initial_interval(Duration::from_secs(30))
            .backoff_coefficient(1.0);
        assert_eq!(policy.backoff(1), policy.backoff(4));
    }

    #[test]
    fn test_attempt_limits() {
        let policy = RetryPolicy::new().maximum_attempts(3);
        assert!(policy.allows_attempt_after(1));
        assert!(policy.allows_attempt_after(2));
        assert!(!policy.allows_attempt_after(3));

        let unlimited = RetryPolicy::new();
        assert!(unlimited.allows_attempt_after(10_000));
    }

    #[test]
    fn test_non_retryable_error_stops_retries() {
        let policy = RetryPolicy::new().maximum_attempts(5);
        assert!(policy
            .next_backoff(1, &ActivityError::non_retryable("rejected"))
            .is_none());
        assert_eq!(
            policy.next_backoff(1, &ActivityError::timeout("slow")),
            Some(Duration::from_secs(1))
        );
    }
}
