//! Diagnostic snapshot of engine state.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use warden_core::RetryState;

use crate::history::ErrorRecord;
use crate::metrics::MetricsSnapshot;
use crate::state::StatusState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheSnapshot {
    pub value: Option<bool>,
    pub valid: bool,
    pub age_ms: Option<u64>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InFlightSnapshot {
    pub op_id: u64,
    pub followers: u32,
    pub elapsed_ms: u64,
    pub settled: bool,
}

/// Everything `inspect()` exposes. Durations are relative to `captured_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugSnapshot {
    pub cache: CacheSnapshot,
    pub last_known: Option<bool>,
    pub grace_active: bool,
    pub grace_remaining_ms: Option<u64>,
    pub in_flight: Option<InFlightSnapshot>,
    pub loading: bool,
    pub retry: RetryState,
    pub refresh_armed: bool,
    pub refresh_due_in_ms: Option<u64>,
    pub recent_errors: Vec<ErrorRecord>,
    pub total_errors: u64,
    pub listeners: usize,
    pub epoch: u64,
    pub metrics: MetricsSnapshot,
    pub captured_at: DateTime<Utc>,
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl DebugSnapshot {
    pub(crate) fn capture(
        state: &StatusState,
        now: Instant,
        listeners: usize,
        metrics: MetricsSnapshot,
    ) -> Self {
        let cache = CacheSnapshot {
            value: state.cache.value(),
            valid: state.cache.is_valid(now),
            age_ms: state.cache.age(now).map(millis),
            timeout_ms: millis(state.cache.timeout()),
        };

        let in_flight = state.in_flight.as_ref().map(|op| InFlightSnapshot {
            op_id: op.id,
            followers: op.followers,
            elapsed_ms: millis(now.saturating_duration_since(op.started_at)),
            settled: op.is_settled(),
        });

        Self {
            cache,
            last_known: state.cache.last_known(),
            grace_active: state.grace.is_active(now),
            grace_remaining_ms: state.grace.remaining(now).map(millis),
            in_flight,
            loading: state.loading,
            retry: state.retry,
            refresh_armed: state.refresh.is_armed(),
            refresh_due_in_ms: state.refresh.remaining(now).map(millis),
            recent_errors: state.history.records().cloned().collect(),
            total_errors: state.history.total(),
            listeners,
            epoch: state.epoch,
            metrics,
            captured_at: Utc::now(),
        }
    }
}
