//! Engine counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for status engine activity since startup.
#[derive(Debug, Default)]
pub struct StatusMetrics {
    /// Authoritative lookups requested by callers
    pub lookups: AtomicU64,

    /// Reads answered from a valid cache
    pub cache_hits: AtomicU64,

    /// Callers that joined an already running lookup
    pub joined_lookups: AtomicU64,

    /// Calls made to the authority transport
    pub transport_calls: AtomicU64,

    /// Failed transport calls
    pub failures: AtomicU64,

    /// Retries scheduled after a failure
    pub retries: AtomicU64,

    /// Lookups resolved from the last-known status under grace
    pub grace_fallbacks: AtomicU64,

    /// Lookups resolved optimistically with no prior answer
    pub optimistic_grants: AtomicU64,

    /// Lookups ending in an authentication rejection
    pub auth_rejections: AtomicU64,

    /// Background refreshes started
    pub background_refreshes: AtomicU64,

    /// Individual repairs made by the consistency validator
    pub repairs: AtomicU64,
}

impl StatusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lookups: self.lookups.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            joined_lookups: self.joined_lookups.load(Ordering::Relaxed),
            transport_calls: self.transport_calls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            grace_fallbacks: self.grace_fallbacks.load(Ordering::Relaxed),
            optimistic_grants: self.optimistic_grants.load(Ordering::Relaxed),
            auth_rejections: self.auth_rejections.load(Ordering::Relaxed),
            background_refreshes: self.background_refreshes.load(Ordering::Relaxed),
            repairs: self.repairs.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StatusMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub lookups: u64,
    pub cache_hits: u64,
    pub joined_lookups: u64,
    pub transport_calls: u64,
    pub failures: u64,
    pub retries: u64,
    pub grace_fallbacks: u64,
    pub optimistic_grants: u64,
    pub auth_rejections: u64,
    pub background_refreshes: u64,
    pub repairs: u64,
}
