//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use failsafe::backoff::{self, EqualJittered, Exponential};

use crate::clients::Operation;
use crate::error::ClientError;

/// Backoff parameters for retrying transient failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Randomize each delay between half and all of its exponential value.
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    /// A single attempt, never retried.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// The sequence of delays between consecutive attempts.
    pub fn delays(&self) -> Backoff {
        let max = self.max_delay.max(self.base_delay);
        if self.jitter {
            Backoff::Jittered(backoff::equal_jittered(self.base_delay, max))
        } else {
            Backoff::Exponential(backoff::exponential(self.base_delay, max))
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(100), Duration::from_secs(2))
    }
}

/// Delay iterator produced by [`RetryPolicy::delays`].
pub enum Backoff {
    Exponential(Exponential),
    Jittered(EqualJittered),
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        match self {
            Backoff::Exponential(inner) => inner.next(),
            Backoff::Jittered(inner) => inner.next(),
        }
    }
}

/// Result of a retried call together with the number of attempts it took.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, ClientError>,
    pub attempts: u32,
}

impl<T> Attempted<T> {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Calls `attempt` until it succeeds, fails permanently or the budget runs out.
///
/// Operations that are not safe to repeat get exactly one attempt whatever the
/// policy says. A transient error that survives the last attempt comes back
/// escalated to permanent.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: Operation, mut attempt: F) -> Attempted<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let max_attempts = if operation.is_retryable() {
        policy.max_attempts.max(1)
    } else {
        1
    };
    let mut delays = policy.delays();
    let mut attempts = 0;

    loop {
        attempts += 1;
        let error = match attempt(attempts).await {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts,
                };
            }
            Err(error) => error,
        };

        if !error.is_retryable() {
            return Attempted {
                result: Err(error),
                attempts,
            };
        }
        if attempts >= max_attempts {
            tracing::warn!(%operation, attempts, error = %error, "retries exhausted");
            return Attempted {
                result: Err(error.escalate(attempts)),
                attempts,
            };
        }

        let delay = delays.next().unwrap_or(policy.max_delay);
        metrics::counter!("dependency_retries_total", "operation" => operation.as_str())
            .increment(1);
        tracing::warn!(
            %operation,
            attempt = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "retrying dependency call"
        );
        tokio::time::sleep(delay).await;
    }
}
