//! Bounded polling.
//!
//! Every wait in a cold start has an attempt ceiling and a fixed interval.
//! [`poll_until`] is the single place that loop lives, so no phase can end
//! up waiting forever on a collaborator.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Attempt budget and fixed interval for a polling loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least one attempt is always made).
    pub max_attempts: u32,
    /// Sleep between two consecutive attempts, in milliseconds.
    pub interval_ms: u64,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, interval_ms: u64) -> Self {
        Self {
            max_attempts,
            interval_ms,
        }
    }

    /// Policy that never sleeps, for tests and one-shot checks.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, 0)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Upper bound on the time spent sleeping by a loop using this policy.
    pub fn max_wait(&self) -> Duration {
        self.interval()
            .saturating_mul(self.max_attempts.saturating_sub(1))
    }
}

/// Result of a bounded polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// The predicate accepted a value.
    Ready { value: T, attempts: u32 },
    /// The budget ran out. `last` is the value of the final attempt.
    TimedOut { last: Option<T>, attempts: u32 },
}

impl<T> RetryOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Ready { attempts, .. } | Self::TimedOut { attempts, .. } => *attempts,
        }
    }
}

/// Run `operation` until `ready` accepts its output or the budget runs out.
///
/// The operation receives the 1-based attempt number. Sleeps happen only
/// between attempts, never after the last one. A policy with
/// `max_attempts == 0` still makes a single attempt.
pub async fn poll_until<T, F, Fut, P>(
    policy: RetryPolicy,
    mut operation: F,
    mut ready: P,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
    P: FnMut(&T) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let interval = policy.interval();
    let mut last = None;

    for attempt in 1..=max_attempts {
        let value = operation(attempt).await;
        if ready(&value) {
            return RetryOutcome::Ready {
                value,
                attempts: attempt,
            };
        }
        last = Some(value);

        if attempt < max_attempts && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }

    RetryOutcome::TimedOut {
        last,
        attempts: max_attempts,
    }
}
