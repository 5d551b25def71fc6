//! One-shot background refresh armed after each successful lookup.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::coordinator::Inner;
use crate::state::StatusState;

#[derive(Debug, Default)]
pub(crate) struct RefreshTimer {
    task: Option<JoinHandle<()>>,
    due_at: Option<Instant>,
}

impl RefreshTimer {
    /// Abort a pending refresh. Returns true if one was armed.
    pub fn cancel(&mut self) -> bool {
        self.due_at = None;
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    /// Called by the timer task once it fires. Detaches instead of aborting,
    /// since the caller is the task being released. Returns false if a newer
    /// timer replaced this one in the meantime.
    pub fn fired(&mut self, now: Instant) -> bool {
        match self.due_at {
            Some(due_at) if due_at <= now => {
                self.task = None;
                self.due_at = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.due_at.map(|due_at| due_at.saturating_duration_since(now))
    }
}

/// Cancel any pending refresh and arm a new one.
///
/// The timer task holds only a weak reference, so an engine dropped before
/// the timer fires is not kept alive by it.
pub(crate) fn arm(inner: &Arc<Inner>, state: &mut StatusState) {
    state.refresh.cancel();

    let delay = inner.config.refresh_delay();
    let engine = Arc::downgrade(inner);
    let task = inner.runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(inner) = engine.upgrade() {
            inner.refresh_from_timer();
        }
    });

    state.refresh.task = Some(task);
    state.refresh.due_at = Some(Instant::now() + delay);
    debug!(delay_ms = delay.as_millis() as u64, "Background refresh armed");
}
