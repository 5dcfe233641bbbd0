//! Retry policy engine
//!
//! Wraps a single external call in exponential backoff. The engine knows
//! nothing about business data: it only looks at how a failure is
//! classified and how long to wait before trying again.
//!
//! Delay after failed attempt `k` (1-based) is `initial_delay * exp_base^(k-1)`,
//! so with the defaults (5 attempts, base 7, 1s) the waits are 1s, 7s, 49s, 343s.

use crate::workflow::error::ConfigurationError;
use crate::workflow::types::Stage;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How a failed call should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Expected to self-resolve (rate limiting, temporary unavailability, timeouts)
    Transient,
    /// Will not resolve by retrying
    Fatal,
}

/// Outcome of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The call succeeded
    Ok,
    /// The call failed with a retryable error
    TransientError,
    /// The call failed with a non-retryable error
    FatalError,
}

/// One try of a stage's external call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageAttempt {
    /// Stage the call belongs to
    pub stage: Stage,
    /// 1-based attempt number
    pub attempt: u32,
    /// What happened
    pub outcome: AttemptOutcome,
    /// Wait scheduled before the next attempt, if the call is retried
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait: Option<Duration>,
}

/// Why the engine stopped without a success
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryError<E> {
    /// The last failure was classified fatal
    Fatal {
        /// The failure
        error: E,
        /// Calls made
        attempts: u32,
    },
    /// All attempts failed with transient errors
    Exhausted {
        /// Last failure
        error: E,
        /// Calls made
        attempts: u32,
    },
    /// The cancellation token fired before or between attempts
    Cancelled {
        /// Calls made before cancellation
        attempts: u32,
    },
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Fatal { error, .. } => write!(f, "{}", error),
            RetryError::Exhausted { error, attempts } => {
                write!(f, "{} (gave up after {} attempts)", error, attempts)
            }
            RetryError::Cancelled { .. } => write!(f, "cancelled"),
        }
    }
}

/// Result of [`RetryPolicy::attempt`]: the final outcome plus the attempt trail
#[derive(Debug)]
pub struct OperationResult<T, E> {
    /// Success value or the reason the engine stopped
    pub outcome: Result<T, RetryError<E>>,
    /// Every attempt made, in order
    pub attempts: Vec<StageAttempt>,
}

impl<T, E> OperationResult<T, E> {
    /// Number of times the operation was invoked
    pub fn calls(&self) -> usize {
        self.attempts.len()
    }
}

/// Exponential backoff policy bounded by a maximum attempt count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    exp_base: u32,
    initial_delay: Duration,
}

impl RetryPolicy {
    /// Default maximum attempt count
    pub const DEFAULT_MAX_ATTEMPTS: i64 = 5;
    /// Default backoff multiplier
    pub const DEFAULT_EXP_BASE: u32 = 7;
    /// Default delay after the first failure
    pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

    /// Build a policy
    ///
    /// # Errors
    /// * `ConfigurationError::InvalidMaxAttempts` if `max_attempts <= 0`
    /// * `ConfigurationError::InvalidExpBase` if `exp_base == 0`
    pub fn new(
        max_attempts: i64,
        exp_base: u32,
        initial_delay: Duration,
    ) -> Result<Self, ConfigurationError> {
        if max_attempts <= 0 {
            return Err(ConfigurationError::InvalidMaxAttempts(max_attempts));
        }
        if exp_base == 0 {
            return Err(ConfigurationError::InvalidExpBase);
        }
        let max_attempts = u32::try_from(max_attempts).unwrap_or(u32::MAX);
        Ok(Self {
            max_attempts,
            exp_base,
            initial_delay,
        })
    }

    /// Maximum number of calls per operation
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after failed attempt `attempt` (1-based), saturating at `Duration::MAX`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        self.exp_base
            .checked_pow(exponent)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Invoke `operation` until it succeeds, fails fatally, runs out of
    /// attempts, or `cancel` fires
    ///
    /// `classify` maps each failure to [`FailureClass`]; only transient
    /// failures are retried. The backoff wait yields the task and is
    /// interrupted by cancellation.
    pub async fn attempt<T, E, F, Fut, C>(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
        mut operation: F,
        classify: C,
    ) -> OperationResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> FailureClass,
        E: fmt::Display,
    {
        let mut attempts: Vec<StageAttempt> = Vec::new();
        let mut number: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return cancelled(attempts, number);
            }
            number += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = operation() => Some(result),
            };
            let Some(result) = result else {
                tracing::info!(stage = %stage, attempt = number, "Call interrupted by cancellation");
                return cancelled(attempts, number - 1);
            };

            let error = match result {
                Ok(value) => {
                    attempts.push(StageAttempt {
                        stage,
                        attempt: number,
                        outcome: AttemptOutcome::Ok,
                        wait: None,
                    });
                    tracing::debug!(stage = %stage, attempt = number, "Call succeeded");
                    return OperationResult {
                        outcome: Ok(value),
                        attempts,
                    };
                }
                Err(error) => error,
            };

            if classify(&error) == FailureClass::Fatal {
                attempts.push(StageAttempt {
                    stage,
                    attempt: number,
                    outcome: AttemptOutcome::FatalError,
                    wait: None,
                });
                tracing::error!(
                    stage = %stage,
                    attempt = number,
                    error = %error,
                    "Call failed with non-retryable error"
                );
                return OperationResult {
                    outcome: Err(RetryError::Fatal {
                        error,
                        attempts: number,
                    }),
                    attempts,
                };
            }

            if number >= self.max_attempts {
                attempts.push(StageAttempt {
                    stage,
                    attempt: number,
                    outcome: AttemptOutcome::TransientError,
                    wait: None,
                });
                tracing::error!(
                    stage = %stage,
                    attempts = number,
                    error = %error,
                    "Retry attempts exhausted"
                );
                return OperationResult {
                    outcome: Err(RetryError::Exhausted {
                        error,
                        attempts: number,
                    }),
                    attempts,
                };
            }

            let wait = self.delay_after(number);
            attempts.push(StageAttempt {
                stage,
                attempt: number,
                outcome: AttemptOutcome::TransientError,
                wait: Some(wait),
            });
            tracing::warn!(
                stage = %stage,
                attempt = number,
                max_attempts = self.max_attempts,
                delay_ms = wait.as_millis() as u64,
                error = %error,
                "Transient failure, backing off before retry"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return cancelled(attempts, number),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS as u32,
            exp_base: Self::DEFAULT_EXP_BASE,
            initial_delay: Self::DEFAULT_INITIAL_DELAY,
        }
    }
}

fn cancelled<T, E>(attempts: Vec<StageAttempt>, calls: u32) -> OperationResult<T, E> {
    OperationResult {
        outcome: Err(RetryError::Cancelled { attempts: calls }),
        attempts,
    }
}
