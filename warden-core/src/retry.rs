//! Retry policy with exponential backoff and jitter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::classify::{Classification, ErrorKind};
use crate::config::StatusConfig;

/// Backoff and retry budget for authoritative lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: f64,
    pub min_delay: Duration,
    pub rate_limit_min_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&StatusConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &StatusConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay,
            multiplier: config.backoff_multiplier,
            max_delay: config.max_delay,
            jitter: config.jitter,
            min_delay: config.min_delay,
            rate_limit_min_delay: config.rate_limit_min_delay,
        }
    }

    /// Ceiling on failures in a row, across lookups, before retries stop.
    pub fn consecutive_failure_limit(&self) -> u32 {
        self.max_retries.saturating_mul(2)
    }

    /// Whether a failed attempt should be retried.
    ///
    /// `attempt` is the zero-based index of the attempt that just failed and
    /// `consecutive_failures` already includes it.
    pub fn should_retry(
        &self,
        classification: &Classification,
        attempt: u32,
        consecutive_failures: u32,
    ) -> bool {
        classification.retryable
            && attempt < self.max_retries
            && consecutive_failures <= self.consecutive_failure_limit()
    }

    /// Backoff before retrying after `attempt` failed, with random jitter.
    pub fn delay(&self, attempt: u32, kind: ErrorKind) -> Duration {
        let sample = if self.jitter > 0.0 {
            rand::rng().random_range(-1.0..=1.0)
        } else {
            0.0
        };
        self.delay_with_jitter(attempt, kind, sample)
    }

    /// Deterministic backoff. `sample` in `[-1, 1]` scales the jitter band.
    pub fn delay_with_jitter(&self, attempt: u32, kind: ErrorKind, sample: f64) -> Duration {
        let max_ms = self.max_delay.as_millis() as f64;
        let exponential = self.base_delay.as_millis() as f64
            * self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let capped = exponential.min(max_ms);
        let jittered = capped * (1.0 + self.jitter * sample.clamp(-1.0, 1.0));

        let floor = if kind == ErrorKind::RateLimit {
            self.min_delay.max(self.rate_limit_min_delay)
        } else {
            self.min_delay
        };

        let millis = jittered.min(max_ms).max(floor.as_millis() as f64);
        Duration::from_millis(millis.round() as u64)
    }
}

/// Per-session retry bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    /// Attempt index within the current lookup.
    pub attempt: u32,
    pub last_error: Option<ErrorKind>,
    /// Failures in a row, persisted across lookups until a success.
    pub consecutive_failures: u32,
}

impl RetryState {
    /// Record a failed attempt, returning the updated failure streak.
    pub fn record_failure(&mut self, kind: ErrorKind) -> u32 {
        self.last_error = Some(kind);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
