//! Public handle to the status engine.

use std::sync::{Arc, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info};

use warden_core::{
    AuthorityTransport, NoSession, SessionSignal, StatusConfig, StatusError, StatusResult,
};

use crate::coordinator::Inner;
use crate::listeners::{ChangeCause, StatusChange, SubscriptionId};
use crate::metrics::{MetricsSnapshot, StatusMetrics};
use crate::snapshot::DebugSnapshot;
use crate::validator::{self, Repair};

/// Privilege status engine for one principal session.
///
/// Cheap to clone; clones share the same state. Background tasks hold weak
/// references, so dropping every handle also winds them down.
///
/// ```ignore
/// let engine = StatusEngine::builder(Arc::new(transport))
///     .config(StatusConfig::from_env())
///     .start()?;
///
/// if engine.best_known_status() {
///     // render privileged UI
/// }
/// let confirmed = engine.lookup().await?;
/// ```
#[derive(Clone)]
pub struct StatusEngine {
    inner: Arc<Inner>,
}

pub struct StatusEngineBuilder {
    transport: Arc<dyn AuthorityTransport>,
    config: StatusConfig,
    session: Arc<dyn SessionSignal>,
}

impl StatusEngineBuilder {
    pub fn config(mut self, config: StatusConfig) -> Self {
        self.config = config;
        self
    }

    /// Identity-provider signal consulted by the optimistic fallback.
    pub fn session_signal(mut self, session: Arc<dyn SessionSignal>) -> Self {
        self.session = session;
        self
    }

    /// Validate the config and start the engine on the current runtime.
    pub fn start(self) -> StatusResult<StatusEngine> {
        self.config.validate()?;
        let runtime = Handle::try_current().map_err(|_| StatusError::NoRuntime)?;

        let inner = Arc::new(Inner::new(
            self.config,
            self.transport,
            self.session,
            runtime,
        ));
        let handle = validator::spawn(&inner);
        *inner
            .validator
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);

        info!(
            cache_timeout_ms = inner.config.cache_timeout.as_millis() as u64,
            grace_period_ms = inner.config.grace_period.as_millis() as u64,
            max_retries = inner.config.max_retries,
            optimistic_fallback = inner.config.optimistic_fallback,
            "Status engine started"
        );
        Ok(StatusEngine { inner })
    }
}

impl StatusEngine {
    pub fn builder(transport: Arc<dyn AuthorityTransport>) -> StatusEngineBuilder {
        StatusEngineBuilder {
            transport,
            config: StatusConfig::default(),
            session: Arc::new(NoSession),
        }
    }

    pub fn start(
        transport: Arc<dyn AuthorityTransport>,
        config: StatusConfig,
    ) -> StatusResult<Self> {
        Self::builder(transport).config(config).start()
    }

    pub fn config(&self) -> &StatusConfig {
        &self.inner.config
    }

    /// Best answer available right now. Never blocks and never fails.
    ///
    /// Resolution order: valid cache, then last-known status while a lookup
    /// runs, then last-known status under an active grace window. Failing
    /// all three, a lookup is started in the background if none is running
    /// and the last-known status (or `false`) is returned.
    pub fn best_known_status(&self) -> bool {
        let inner = &self.inner;
        let mut state = inner.state();
        let now = Instant::now();

        if let Some(value) = state.cache.read(now) {
            StatusMetrics::bump(&inner.metrics.cache_hits);
            return value;
        }

        let last_known = state.cache.last_known();
        let in_flight = state.has_active_lookup();
        if let Some(value) = last_known {
            if in_flight || state.grace.is_active(now) {
                return value;
            }
        }

        if !in_flight {
            debug!("No fresh status, starting background lookup");
            drop(inner.begin(&mut state));
        }
        last_known.unwrap_or(false)
    }

    /// Authoritative lookup. Resolves to a boolean even when the authority
    /// is unreachable; only an internal failure is an error.
    pub async fn lookup(&self) -> StatusResult<bool> {
        self.inner.lookup().await
    }

    /// Force the next lookup to reach the authority. Keeps the last-known
    /// status for degradation and cancels the pending refresh.
    pub fn invalidate(&self) {
        let mut state = self.inner.state();
        state.cache.invalidate();
        let cancelled = state.refresh.cancel();
        info!(refresh_cancelled = cancelled, "Status cache invalidated");
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&StatusChange) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }

    pub fn changes(&self) -> broadcast::Receiver<StatusChange> {
        self.inner.listeners.changes()
    }

    /// New principal: drop everything from the previous session and look up
    /// the new one's status.
    pub fn on_principal_established(&self) {
        let inner = &self.inner;
        let epoch = {
            let mut state = inner.state();
            let epoch = state.reset();
            inner.epochs.send_replace(epoch);
            drop(inner.begin(&mut state));
            epoch
        };
        info!(epoch, "Principal established");
    }

    /// Principal gone: hard-clear all state, resolve any running lookup to
    /// `false`, and tell listeners.
    pub fn on_principal_cleared(&self) {
        let inner = &self.inner;
        let (epoch, previous) = {
            let mut state = inner.state();
            let previous = state.cache.last_known();
            let epoch = state.reset();
            inner.epochs.send_replace(epoch);
            (epoch, previous)
        };
        info!(epoch, "Principal cleared");
        inner
            .listeners
            .notify(StatusChange::new(false, previous, ChangeCause::PrincipalCleared));
    }

    pub fn inspect(&self) -> DebugSnapshot {
        let inner = &self.inner;
        let metrics = inner.metrics.snapshot();
        let listeners = inner.listeners.len();
        let state = inner.state();
        DebugSnapshot::capture(&state, Instant::now(), listeners, metrics)
    }

    /// Run the consistency validator once, now.
    pub fn check_consistency(&self) -> Vec<Repair> {
        self.inner.sweep()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Stop the validator and cancel the pending refresh. A lookup already
    /// running still settles.
    pub fn shutdown(&self) {
        let validator = self
            .inner
            .validator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(validator) = validator {
            validator.stop();
        }
        self.inner.state().refresh.cancel();
        info!("Status engine shut down");
    }
}

impl std::fmt::Debug for StatusEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusEngine")
            .field("config", &self.inner.config)
            .field("listeners", &self.inner.listeners)
            .finish_non_exhaustive()
    }
}
