//! Status cache with a last-known value that outlives freshness.

use std::time::Duration;
use tokio::time::Instant;

/// Last authoritative answer plus the value kept for graceful degradation.
///
/// `value` and `as_of` are set together by [`StatusCache::write`]. They are
/// stored separately so a partially mutated entry stays observable to the
/// consistency validator instead of being hidden by the type.
#[derive(Debug, Clone)]
pub struct StatusCache {
    value: Option<bool>,
    as_of: Option<Instant>,
    last_known: Option<bool>,
    timeout: Duration,
}

impl StatusCache {
    pub fn new(timeout: Duration) -> Self {
        Self {
            value: None,
            as_of: None,
            last_known: None,
            timeout,
        }
    }

    /// True iff a value is held and it is younger than the cache timeout.
    pub fn is_valid(&self, now: Instant) -> bool {
        match (self.value, self.as_of) {
            (Some(_), Some(as_of)) => now.saturating_duration_since(as_of) < self.timeout,
            _ => false,
        }
    }

    /// The cached value, only while valid.
    pub fn read(&self, now: Instant) -> Option<bool> {
        if self.is_valid(now) {
            self.value
        } else {
            None
        }
    }

    /// Store an authoritative answer. Also becomes the last-known status.
    pub fn write(&mut self, value: bool, now: Instant) {
        self.value = Some(value);
        self.as_of = Some(now);
        self.last_known = Some(value);
    }

    /// Drop the cached answer but keep the last-known status.
    pub fn invalidate(&mut self) {
        self.value = None;
        self.as_of = None;
    }

    /// Drop everything, including the last-known status.
    pub fn clear(&mut self) {
        self.invalidate();
        self.last_known = None;
    }

    pub fn value(&self) -> Option<bool> {
        self.value
    }

    pub fn as_of(&self) -> Option<Instant> {
        self.as_of
    }

    pub fn last_known(&self) -> Option<bool> {
        self.last_known
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Age of the cached answer, if one is stamped.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.as_of.map(|as_of| now.saturating_duration_since(as_of))
    }

    /// Re-stamp a value that lost its timestamp.
    pub(crate) fn stamp(&mut self, now: Instant) {
        self.as_of = Some(now);
    }

    #[cfg(test)]
    pub(crate) fn from_parts(
        value: Option<bool>,
        as_of: Option<Instant>,
        last_known: Option<bool>,
        timeout: Duration,
    ) -> Self {
        Self {
            value,
            as_of,
            last_known,
            timeout,
        }
    }
}
