//! Mutable engine state, guarded by one lock in the coordinator.

use futures_util::future::{BoxFuture, Shared};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use warden_core::{RetryState, StatusConfig, StatusResult};

use crate::cache::StatusCache;
use crate::grace::GracePeriod;
use crate::history::ErrorHistory;
use crate::refresh::RefreshTimer;

/// Cloneable handle to a running lookup. Every caller awaiting the same
/// lookup holds a clone and observes the same outcome.
pub(crate) type SharedLookup = Shared<BoxFuture<'static, StatusResult<bool>>>;

/// The single in-flight authoritative lookup.
pub(crate) struct InFlight {
    pub id: u64,
    pub future: SharedLookup,
    pub task: AbortHandle,
    /// Callers that joined after the lookup started.
    pub followers: u32,
    pub started_at: Instant,
}

impl InFlight {
    /// A lookup whose task already ended but whose slot was never cleared,
    /// e.g. because the task panicked before settling.
    pub fn is_settled(&self) -> bool {
        self.task.is_finished() || self.future.peek().is_some()
    }
}

pub(crate) struct StatusState {
    pub cache: StatusCache,
    pub grace: GracePeriod,
    pub retry: RetryState,
    pub in_flight: Option<InFlight>,
    pub loading: bool,
    pub refresh: RefreshTimer,
    pub history: ErrorHistory,
    /// Bumped on every principal change. Lookups from an older epoch never
    /// write.
    pub epoch: u64,
    pub next_op_id: u64,
}

impl StatusState {
    pub fn new(config: &StatusConfig) -> Self {
        Self {
            cache: StatusCache::new(config.cache_timeout),
            grace: GracePeriod::new(),
            retry: RetryState::default(),
            in_flight: None,
            loading: false,
            refresh: RefreshTimer::default(),
            history: ErrorHistory::new(config.error_history_capacity),
            epoch: 0,
            next_op_id: 1,
        }
    }

    /// The running lookup, ignoring one that settled without being cleared.
    pub fn active_lookup(&self) -> Option<&InFlight> {
        self.in_flight.as_ref().filter(|op| !op.is_settled())
    }

    pub fn has_active_lookup(&self) -> bool {
        self.active_lookup().is_some()
    }

    /// Release the in-flight slot if `id` still owns it.
    pub fn finish(&mut self, id: u64) -> bool {
        if self.in_flight.as_ref().is_some_and(|op| op.id == id) {
            self.in_flight = None;
            self.loading = false;
            true
        } else {
            false
        }
    }

    /// Best answer available without a lookup.
    pub fn current_value(&self, now: Instant) -> bool {
        self.cache
            .read(now)
            .or(self.cache.last_known())
            .unwrap_or(false)
    }

    /// Forget everything tied to the current principal and move to a new
    /// epoch. Returns the new epoch.
    pub fn reset(&mut self) -> u64 {
        self.cache.clear();
        self.grace.clear();
        self.retry.reset();
        self.in_flight = None;
        self.loading = false;
        self.refresh.cancel();
        self.history.clear();
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }
}
