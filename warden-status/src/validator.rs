//! Periodic consistency validator.
//!
//! Each check detects one kind of corrupted state and repairs it in place.
//! Checks are independent; a single sweep may perform several repairs.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::coordinator::Inner;
use crate::listeners::{ChangeCause, StatusChange};
use crate::state::{InFlight, StatusState};

/// A repair made by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Repair {
    /// Cache carried a timestamp but no value; cleared.
    TimestampWithoutValue,
    /// Cache carried a value but no timestamp; stamped with now.
    ValueWithoutTimestamp,
    /// Grace window active with nothing to serve; cleared.
    GraceWithoutLastKnown,
    /// In-flight slot held by a lookup that already ended; released.
    SettledInFlight,
    /// Loading flag set with no lookup in flight; cleared.
    StaleLoadingFlag,
    /// Grace window ended more than one grace duration ago; cleared.
    StaleGracePeriod,
}

impl Repair {
    pub fn as_str(&self) -> &'static str {
        match self {
            Repair::TimestampWithoutValue => "timestamp_without_value",
            Repair::ValueWithoutTimestamp => "value_without_timestamp",
            Repair::GraceWithoutLastKnown => "grace_without_last_known",
            Repair::SettledInFlight => "settled_in_flight",
            Repair::StaleLoadingFlag => "stale_loading_flag",
            Repair::StaleGracePeriod => "stale_grace_period",
        }
    }
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run every check against `state`, repairing as it goes.
pub(crate) fn check_and_repair(
    state: &mut StatusState,
    now: Instant,
    grace_period: Duration,
) -> Vec<Repair> {
    let mut repairs = Vec::new();

    if state.cache.as_of().is_some() && state.cache.value().is_none() {
        state.cache.invalidate();
        repairs.push(Repair::TimestampWithoutValue);
    }

    if state.cache.value().is_some() && state.cache.as_of().is_none() {
        state.cache.stamp(now);
        repairs.push(Repair::ValueWithoutTimestamp);
    }

    if state.grace.is_active(now) && state.cache.last_known().is_none() {
        state.grace.clear();
        repairs.push(Repair::GraceWithoutLastKnown);
    }

    if state.in_flight.as_ref().is_some_and(InFlight::is_settled) {
        state.in_flight = None;
        repairs.push(Repair::SettledInFlight);
    }

    if state.in_flight.is_none() && state.loading {
        state.loading = false;
        repairs.push(Repair::StaleLoadingFlag);
    }

    let stale_grace = state
        .grace
        .ends_at()
        .and_then(|ends_at| now.checked_duration_since(ends_at))
        .is_some_and(|overdue| overdue > grace_period);
    if stale_grace {
        state.grace.clear();
        repairs.push(Repair::StaleGracePeriod);
    }

    repairs
}

impl Inner {
    /// One validator pass. After any repair, listeners hear the current
    /// value and a refresh is started.
    pub(crate) fn sweep(self: &Arc<Self>) -> Vec<Repair> {
        let (repairs, change) = {
            let mut state = self.state();
            let now = Instant::now();
            let repairs = check_and_repair(&mut state, now, self.config.grace_period);
            if repairs.is_empty() {
                return repairs;
            }
            let change = StatusChange::new(
                state.current_value(now),
                state.cache.last_known(),
                ChangeCause::Repaired,
            );
            (repairs, change)
        };

        for repair in &repairs {
            warn!(repair = %repair, "Repaired inconsistent status state");
        }
        self.metrics
            .repairs
            .fetch_add(repairs.len() as u64, Ordering::Relaxed);

        self.listeners.notify(change);
        self.refresh_now();
        repairs
    }
}

/// Running validator task plus its shutdown signal.
pub(crate) struct ValidatorHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ValidatorHandle {
    pub fn stop(self) {
        if self.shutdown_tx.send(true).is_err() {
            self.task.abort();
        }
    }
}

pub(crate) fn spawn(inner: &Arc<Inner>) -> ValidatorHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let period = inner.config.validation_interval;
    let task = inner
        .runtime
        .spawn(validator_task(Arc::downgrade(inner), period, shutdown_rx));
    ValidatorHandle { shutdown_tx, task }
}

async fn validator_task(
    engine: Weak<Inner>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    // First check one full period after start.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        interval_ms = period.as_millis() as u64,
        "Consistency validator started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Consistency validator shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                let Some(inner) = engine.upgrade() else {
                    debug!("Status engine dropped, validator exiting");
                    break;
                };
                if inner.sweep().is_empty() {
                    debug!("Consistency check passed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::StatusCache;
    use crate::grace::GracePeriod;
    use warden_core::StatusConfig;

    const GRACE: Duration = Duration::from_secs(30);

    fn state() -> StatusState {
        StatusState::new(&StatusConfig::default())
    }

    #[test]
    fn test_consistent_state_needs_no_repair() {
        let mut state = state();
        let now = Instant::now();
        assert!(check_and_repair(&mut state, now, GRACE).is_empty());

        state.cache.write(true, now);
        state.grace.start(GRACE, now);
        assert!(check_and_repair(&mut state, now, GRACE).is_empty());
    }

    #[test]
    fn test_timestamp_without_value_cleared() {
        let mut state = state();
        let now = Instant::now();
        state.cache = StatusCache::from_parts(None, Some(now), Some(true), GRACE * 10);

        let repairs = check_and_repair(&mut state, now, GRACE);

        assert_eq!(repairs, vec![Repair::TimestampWithoutValue]);
        assert_eq!(state.cache.as_of(), None);
        assert_eq!(state.cache.last_known(), Some(true));
    }

    #[test]
    fn test_value_without_timestamp_stamped() {
        let mut state = state();
        let now = Instant::now();
        state.cache = StatusCache::from_parts(Some(true), None, Some(true), GRACE * 10);

        let repairs = check_and_repair(&mut state, now, GRACE);

        assert_eq!(repairs, vec![Repair::ValueWithoutTimestamp]);
        assert_eq!(state.cache.as_of(), Some(now));
        assert_eq!(state.cache.read(now), Some(true));
    }

    #[test]
    fn test_grace_without_last_known_cleared() {
        let mut state = state();
        let now = Instant::now();
        state.grace.start(GRACE, now);

        let repairs = check_and_repair(&mut state, now, GRACE);

        assert_eq!(repairs, vec![Repair::GraceWithoutLastKnown]);
        assert!(!state.grace.is_active(now));
    }

    #[test]
    fn test_stale_loading_flag_cleared() {
        let mut state = state();
        state.loading = true;

        let repairs = check_and_repair(&mut state, Instant::now(), GRACE);

        assert_eq!(repairs, vec![Repair::StaleLoadingFlag]);
        assert!(!state.loading);
    }

    #[test]
    fn test_stale_grace_cleared() {
        let mut state = state();
        let now = Instant::now();
        state.cache.write(true, now);
        state.grace = GracePeriod::ending_at(now);

        let shortly_after = now + GRACE;
        assert!(check_and_repair(&mut state, shortly_after, GRACE).is_empty());

        let long_after = now + GRACE * 2;
        let repairs = check_and_repair(&mut state, long_after, GRACE);
        assert_eq!(repairs, vec![Repair::StaleGracePeriod]);
        assert_eq!(state.grace.ends_at(), None);
    }

    #[tokio::test]
    async fn test_settled_in_flight_released() {
        use futures_util::FutureExt;

        let mut state = state();
        let task = tokio::spawn(async {});
        let handle = task.abort_handle();
        task.await.unwrap();

        state.in_flight = Some(InFlight {
            id: 1,
            future: futures_util::future::ready(Ok(true)).boxed().shared(),
            task: handle,
            followers: 2,
            started_at: Instant::now(),
        });
        state.loading = true;

        let repairs = check_and_repair(&mut state, Instant::now(), GRACE);

        assert_eq!(repairs, vec![Repair::SettledInFlight, Repair::StaleLoadingFlag]);
        assert!(state.in_flight.is_none());
        assert!(!state.loading);
    }

    #[test]
    fn test_repair_display() {
        assert_eq!(Repair::StaleGracePeriod.to_string(), "stale_grace_period");
        assert_eq!(
            serde_json::to_value(Repair::SettledInFlight).unwrap(),
            "settled_in_flight"
        );
    }
}
