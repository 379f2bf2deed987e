//! Retry policy for external collaborator calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

/// Bounded exponential backoff.
///
/// Attempt `n` (1-based) that fails is retried after
/// `base_delay_ms * 2^(n-1)`, capped at `max_delay_ms`, plus up to
/// `jitter_ms` of random jitter. After `max_attempts` failures the
/// operation is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound on the computed delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Maximum random jitter added to each delay, in milliseconds.
    pub jitter_ms: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter_ms: 250,
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempts` failures.
    #[must_use]
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Backoff delay after the given number of failed attempts, without
    /// jitter.
    #[must_use]
    pub fn delay_ms(&self, attempts: u32) -> u64 {
        let exponent = attempts.saturating_sub(1).min(32);
        self.base_delay_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_delay_ms)
    }

    /// Time of the next attempt after the given number of failed attempts.
    #[must_use]
    pub fn next_attempt_at(
        &self,
        attempts: u32,
        now: DateTime<Utc>,
        rng: &mut dyn DeterministicRng,
    ) -> DateTime<Utc> {
        let jitter = u64::from(rng.next_u32_range(0, self.jitter_ms));
        let delay = self.delay_ms(attempts).saturating_add(jitter);
        let delay = i64::try_from(delay).unwrap_or(i64::MAX);
        now + chrono::Duration::milliseconds(delay)
    }
}

/// Retry bookkeeping for one pending external operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    /// Failed attempts so far.
    pub attempts: u32,
    /// Earliest time the next attempt may run.
    pub next_attempt_at: DateTime<Utc>,
}

impl RetryState {
    /// State for an operation that has not been attempted yet.
    #[must_use]
    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            attempts: 0,
            next_attempt_at: now,
        }
    }

    /// Whether the next attempt may run at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_attempt_at
    }

    /// Records a failure. Returns `false` once the policy is exhausted.
    pub fn record_failure(
        &mut self,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
        rng: &mut dyn DeterministicRng,
    ) -> bool {
        self.attempts += 1;
        if !policy.allows_retry(self.attempts) {
            return false;
        }
        self.next_attempt_at = policy.next_attempt_at(self.attempts, now, rng);
        true
    }
}
