//! Grace window during which an expired answer may still be served.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct GracePeriod {
    ends_at: Option<Instant>,
}

impl GracePeriod {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, now: Instant) -> bool {
        self.ends_at.is_some_and(|ends_at| now < ends_at)
    }

    /// Start or extend the window to `now + duration`. Never shrinks it.
    pub fn start(&mut self, duration: Duration, now: Instant) -> Instant {
        let candidate = now + duration;
        let ends_at = match self.ends_at {
            Some(existing) => existing.max(candidate),
            None => candidate,
        };
        self.ends_at = Some(ends_at);
        ends_at
    }

    pub fn clear(&mut self) {
        self.ends_at = None;
    }

    pub fn ends_at(&self) -> Option<Instant> {
        self.ends_at
    }

    /// Time left in an active window.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.ends_at
            .filter(|ends_at| now < *ends_at)
            .map(|ends_at| ends_at - now)
    }

    #[cfg(test)]
    pub(crate) fn ending_at(ends_at: Instant) -> Self {
        Self {
            ends_at: Some(ends_at),
        }
    }
}
