//! Bounded retry with escalating waits.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::clock::Clock;
use crate::error::FetchError;

/// Result of one attempt, consumed by [`BackoffController`] and never persisted.
pub type AttemptOutcome<T> = Result<T, FetchError>;

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// 1-indexed attempt from which every retry also waits the extra amount.
    pub long_attempt_threshold: u32,
    pub base_wait: Duration,
    pub extra_wait_for_long_attempt: Duration,
}

impl RetryPolicy {
    /// Wait after failed attempt `attempt` (1-indexed) before the next one.
    ///
    /// Escalates when `attempt >= long_attempt_threshold`.
    pub fn wait_after(&self, attempt: u32) -> Duration {
        if attempt >= self.long_attempt_threshold {
            self.base_wait.saturating_add(self.extra_wait_for_long_attempt)
        } else {
            self.base_wait
        }
    }
}

/// Per-date retry bookkeeping. Discarded once the date resolves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempts: u32,
    pub waited: Duration,
}

/// How a retried operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Success { value: T, state: RetryState },
    /// Every attempt failed transiently.
    Exhausted { last_error: FetchError, state: RetryState },
    /// An attempt failed permanently; remaining attempts were skipped.
    Aborted { error: FetchError, state: RetryState },
    /// Shutdown was requested during an inter-attempt wait or while a failing
    /// attempt was running.
    Cancelled { state: RetryState },
}

impl<T> RetryOutcome<T> {
    pub fn state(&self) -> RetryState {
        match self {
            RetryOutcome::Success { state, .. }
            | RetryOutcome::Exhausted { state, .. }
            | RetryOutcome::Aborted { state, .. }
            | RetryOutcome::Cancelled { state } => *state,
        }
    }
}

/// Runs an operation up to `max_attempts` times, sleeping between failures.
#[derive(Debug, Clone)]
pub struct BackoffController {
    policy: RetryPolicy,
}

impl BackoffController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// `op` receives the 1-indexed attempt number. There is no wait after the
    /// final attempt.
    pub async fn run_with_retry<C, T, F, Fut>(&self, clock: &C, mut op: F) -> RetryOutcome<T>
    where
        C: Clock,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AttemptOutcome<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut state = RetryState::default();

        loop {
            state.attempts += 1;
            let attempt = state.attempts;

            let error = match op(attempt).await {
                Ok(value) => return RetryOutcome::Success { value, state },
                Err(error) => error,
            };

            // Ctrl-C reaches the query process too; its failure says nothing about the date.
            if clock.is_shutdown() {
                warn!(attempt, error = %error, "Attempt failed after shutdown was requested");
                return RetryOutcome::Cancelled { state };
            }

            if !error.is_retryable() {
                warn!(attempt, error = %error, "Attempt failed permanently, not retrying");
                return RetryOutcome::Aborted { error, state };
            }

            if attempt >= max_attempts {
                warn!(attempt, max_attempts, error = %error, "Final attempt failed");
                return RetryOutcome::Exhausted {
                    last_error: error,
                    state,
                };
            }

            let wait = self.policy.wait_after(attempt);
            warn!(
                attempt,
                max_attempts,
                wait_secs = wait.as_secs(),
                error = %error,
                "Attempt failed, retrying"
            );

            if clock.sleep(wait).await.is_err() {
                return RetryOutcome::Cancelled { state };
            }
            state.waited = state.waited.saturating_add(wait);
        }
    }
}
