use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{CheckError, CollectError};

/// Time budget of one tester run.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget: Some(budget),
        }
    }

    pub fn none() -> Self {
        Self {
            started: Instant::now(),
            budget: None,
        }
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    /// Time left, or `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.budget
            .map(|budget| budget.saturating_sub(self.started.elapsed()))
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_some_and(|left| left.is_zero())
    }

    /// Cancellation point: fails once the budget is spent.
    pub fn check(&self) -> Result<(), CheckError> {
        match self.budget {
            Some(budget) if self.expired() => Err(CheckError::DeadlineExceeded(budget)),
            _ => Ok(()),
        }
    }

    /// Shorten `timeout` so a call cannot outlive the deadline.
    pub fn clamp(&self, timeout: Duration) -> Duration {
        match self.remaining() {
            Some(left) => timeout.min(left),
            None => timeout,
        }
    }
}

/// Outcome of a collector call that did not fail the tester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<T> {
    Found(T),
    /// The provider signalled that nothing is configured for the resource.
    NotConfigured(String),
}

/// Bounded retry with exponential backoff for transient provider faults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Per-call timeout handed to the collector.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_call_timeout_secs() -> u64 {
    30
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no sleeping.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            ..Self::default()
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Run `call` until it succeeds, hits a non-transient fault, runs out of
    /// attempts or the deadline passes. `call` receives the timeout to use.
    pub fn call<T, F>(
        &self,
        deadline: &Deadline,
        operation: &str,
        mut call: F,
    ) -> Result<Fetched<T>, CheckError>
    where
        F: FnMut(Duration) -> Result<T, CollectError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            deadline.check()?;
            attempt += 1;

            let err = match call(deadline.clamp(self.call_timeout())) {
                Ok(value) => return Ok(Fetched::Found(value)),
                Err(CollectError::NotConfigured { detail, .. }) => {
                    return Ok(Fetched::NotConfigured(detail));
                }
                Err(CollectError::Contract { operation, message }) => {
                    return Err(CheckError::Contract(format!("{operation}: {message}")));
                }
                Err(err) => err,
            };

            if attempt >= max_attempts {
                return Err(CheckError::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last: err,
                });
            }

            let delay = self.backoff(attempt);
            if let (Some(left), Some(budget)) = (deadline.remaining(), deadline.budget()) {
                if delay >= left {
                    return Err(CheckError::DeadlineExceeded(budget));
                }
            }
            tracing::debug!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient provider error, backing off"
            );
            std::thread::sleep(delay);
        }
    }
}
