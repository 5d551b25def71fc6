//! Request coordinator: single-flight authoritative lookups.
//!
//! At most one lookup runs at a time. It is spawned as its own task and
//! exposed as a [`Shared`](futures_util::future::Shared) future, so every
//! caller that arrives while it runs awaits the same settlement. Retries
//! happen inside that task, so followers stay attached across attempts.
//!
//! All state lives behind one `std::sync::Mutex`. The lock is only taken
//! between await points and never held across one.
//!
//! A principal change bumps the session epoch. A lookup from an older epoch
//! resolves `false` and never writes.

use futures_util::FutureExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use warden_core::{
    classify, AuthorityStatus, AuthorityTransport, Classification, ErrorKind, RetryPolicy,
    SessionSignal, Severity, StatusConfig, StatusError, StatusResult, TransportError,
};

use crate::listeners::{ChangeCause, ListenerRegistry, StatusChange};
use crate::metrics::StatusMetrics;
use crate::refresh;
use crate::state::{InFlight, SharedLookup, StatusState};
use crate::validator::ValidatorHandle;

pub(crate) struct Inner {
    pub config: StatusConfig,
    pub policy: RetryPolicy,
    pub transport: Arc<dyn AuthorityTransport>,
    pub session: Arc<dyn SessionSignal>,
    pub state: Mutex<StatusState>,
    pub listeners: ListenerRegistry,
    pub metrics: StatusMetrics,
    pub runtime: Handle,
    pub epochs: watch::Sender<u64>,
    pub validator: Mutex<Option<ValidatorHandle>>,
}

impl Inner {
    pub fn new(
        config: StatusConfig,
        transport: Arc<dyn AuthorityTransport>,
        session: Arc<dyn SessionSignal>,
        runtime: Handle,
    ) -> Self {
        let (epochs, _) = watch::channel(0);
        Self {
            policy: RetryPolicy::from_config(&config),
            state: Mutex::new(StatusState::new(&config)),
            listeners: ListenerRegistry::new(config.change_channel_capacity),
            metrics: StatusMetrics::new(),
            validator: Mutex::new(None),
            config,
            transport,
            session,
            runtime,
            epochs,
        }
    }

    pub fn state(&self) -> MutexGuard<'_, StatusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Authoritative lookup: valid cache, else join the running lookup,
    /// else start one.
    pub async fn lookup(self: &Arc<Self>) -> StatusResult<bool> {
        StatusMetrics::bump(&self.metrics.lookups);
        let pending = {
            let mut state = self.state();
            if let Some(value) = state.cache.read(Instant::now()) {
                StatusMetrics::bump(&self.metrics.cache_hits);
                return Ok(value);
            }
            self.join_or_begin(&mut state)
        };
        pending.await
    }

    pub fn join_or_begin(self: &Arc<Self>, state: &mut StatusState) -> SharedLookup {
        if let Some(op) = state.in_flight.as_mut().filter(|op| !op.is_settled()) {
            op.followers = op.followers.saturating_add(1);
            StatusMetrics::bump(&self.metrics.joined_lookups);
            debug!(op_id = op.id, followers = op.followers, "Joined in-flight lookup");
            return op.future.clone();
        }
        self.begin(state)
    }

    /// Start a lookup task and install it as the in-flight operation.
    ///
    /// The caller holds the state lock, so the task cannot settle before the
    /// slot is filled.
    pub fn begin(self: &Arc<Self>, state: &mut StatusState) -> SharedLookup {
        let id = state.next_op_id;
        state.next_op_id = state.next_op_id.wrapping_add(1);
        let epoch = state.epoch;

        let task = self.runtime.spawn(Arc::clone(self).run(id, epoch));
        let handle = task.abort_handle();
        let future = task
            .map(|joined| {
                joined.unwrap_or_else(|err| {
                    Err(StatusError::LookupTask {
                        reason: err.to_string(),
                    })
                })
            })
            .boxed()
            .shared();

        state.in_flight = Some(InFlight {
            id,
            future: future.clone(),
            task: handle,
            followers: 0,
            started_at: Instant::now(),
        });
        state.loading = true;
        state.retry.attempt = 0;
        debug!(op_id = id, epoch, "Starting authoritative lookup");
        future
    }

    /// Start a lookup unless one is already running. Used by the refresh
    /// timer and the validator, neither of which consults the cache.
    pub fn refresh_now(self: &Arc<Self>) -> bool {
        let mut state = self.state();
        if state.has_active_lookup() {
            debug!("Refresh skipped, lookup already in flight");
            return false;
        }
        StatusMetrics::bump(&self.metrics.background_refreshes);
        drop(self.begin(&mut state));
        true
    }

    pub fn refresh_from_timer(self: &Arc<Self>) {
        let due = self.state().refresh.fired(Instant::now());
        if due && self.refresh_now() {
            debug!("Background refresh started");
        }
    }

    async fn run(self: Arc<Self>, id: u64, epoch: u64) -> StatusResult<bool> {
        let epochs = self.epochs.subscribe();
        tokio::select! {
            privileged = self.attempt_loop(id, epoch) => Ok(privileged),
            _ = superseded(epochs, epoch) => {
                debug!(op_id = id, epoch, "Lookup superseded by principal change");
                Ok(false)
            }
        }
    }

    async fn attempt_loop(self: &Arc<Self>, id: u64, epoch: u64) -> bool {
        let mut attempt: u32 = 0;
        loop {
            StatusMetrics::bump(&self.metrics.transport_calls);
            let error = match self.transport.fetch_status().await {
                Ok(status) => return self.settle_success(id, epoch, status, attempt),
                Err(error) => error,
            };

            StatusMetrics::bump(&self.metrics.failures);
            let classification = classify(&error);
            let retry = {
                let mut state = self.state();
                if state.epoch != epoch {
                    return false;
                }
                let streak = state.retry.record_failure(classification.kind);
                state.history.record(&error, classification, attempt);
                self.policy.should_retry(&classification, attempt, streak)
            };

            if !retry {
                return self.settle_failure(id, epoch, classification, &error, attempt);
            }

            let delay = self.policy.delay(attempt, classification.kind);
            warn!(
                op_id = id,
                attempt,
                kind = %classification.kind,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Authority lookup failed, retrying"
            );
            StatusMetrics::bump(&self.metrics.retries);
            tokio::time::sleep(delay).await;

            attempt += 1;
            {
                let mut state = self.state();
                if state.epoch != epoch {
                    return false;
                }
                state.retry.attempt = attempt;
            }
        }
    }

    fn settle_success(
        self: &Arc<Self>,
        id: u64,
        epoch: u64,
        status: AuthorityStatus,
        attempt: u32,
    ) -> bool {
        let privileged = status.is_privileged;
        let change = {
            let mut state = self.state();
            if state.epoch != epoch {
                return false;
            }
            let previous = state.cache.last_known();
            state.cache.write(privileged, Instant::now());
            state.retry.reset();
            state.grace.clear();
            state.finish(id);
            refresh::arm(self, &mut state);
            StatusChange::new(privileged, previous, ChangeCause::LookupSucceeded)
        };

        info!(
            op_id = id,
            privileged,
            authenticated = status.is_authenticated,
            attempts = attempt + 1,
            "Authority lookup settled"
        );
        self.listeners.notify(change);
        privileged
    }

    fn settle_failure(
        self: &Arc<Self>,
        id: u64,
        epoch: u64,
        classification: Classification,
        error: &TransportError,
        attempt: u32,
    ) -> bool {
        let kind = classification.kind;
        let (privileged, change) = {
            let mut state = self.state();
            if state.epoch != epoch {
                return false;
            }
            let now = Instant::now();
            let last_known = state.cache.last_known();

            let outcome = match kind {
                ErrorKind::Auth => {
                    state.cache.write(false, now);
                    state.grace.clear();
                    StatusMetrics::bump(&self.metrics.auth_rejections);
                    let change = StatusChange::new(false, last_known, ChangeCause::AuthRejected);
                    (false, Some(change))
                }
                kind if kind.is_transient() || kind == ErrorKind::RateLimit => {
                    let grace = if kind == ErrorKind::RateLimit {
                        self.config.rate_limit_grace()
                    } else {
                        self.config.grace_period
                    };
                    match last_known {
                        Some(value) => {
                            let ends_at = state.grace.start(grace, now);
                            StatusMetrics::bump(&self.metrics.grace_fallbacks);
                            debug!(
                                op_id = id,
                                grace_ms = (ends_at - now).as_millis() as u64,
                                "Serving last-known status under grace"
                            );
                            (value, None)
                        }
                        None => (self.optimistic_fallback(id), None),
                    }
                }
                _ => (last_known.unwrap_or(false), None),
            };
            state.finish(id);
            outcome
        };

        log_final_failure(id, classification, error, attempt, privileged);
        if let Some(change) = change {
            self.listeners.notify(change);
        }
        privileged
    }

    /// Provisional grant when nothing is known yet. Requires both the config
    /// switch and the identity provider's plausible-session signal.
    fn optimistic_fallback(&self, id: u64) -> bool {
        if self.config.optimistic_fallback && self.session.has_plausible_session() {
            StatusMetrics::bump(&self.metrics.optimistic_grants);
            warn!(op_id = id, "Granting provisional privileged status");
            true
        } else {
            false
        }
    }
}

/// Completes once the session epoch moves past `epoch`.
async fn superseded(mut epochs: watch::Receiver<u64>, epoch: u64) {
    loop {
        let current = *epochs.borrow_and_update();
        if current != epoch {
            return;
        }
        if epochs.changed().await.is_err() {
            // Sender gone with the engine; let the attempt loop finish.
            std::future::pending::<()>().await;
        }
    }
}

fn log_final_failure(
    id: u64,
    classification: Classification,
    error: &TransportError,
    attempt: u32,
    privileged: bool,
) {
    let kind = classification.kind;
    match classification.severity {
        Severity::High | Severity::Medium => warn!(
            op_id = id,
            kind = %kind,
            attempts = attempt + 1,
            privileged,
            error = %error,
            "Authority lookup failed"
        ),
        Severity::Low => info!(
            op_id = id,
            kind = %kind,
            attempts = attempt + 1,
            privileged,
            error = %error,
            "Authority lookup rejected"
        ),
    }
}
