//! Listener registry for status changes.
//!
//! Two delivery paths share one notification:
//!
//! - Callback listeners, invoked synchronously in subscription order. A
//!   panicking listener is logged and skipped; the rest still run.
//! - A broadcast channel for async consumers. Slow receivers lag and miss
//!   events rather than blocking the engine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, error};
use uuid::Uuid;

/// Callback invoked on every status notification.
pub type Listener = Arc<dyn Fn(&StatusChange) + Send + Sync>;

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    /// The authority answered
    LookupSucceeded,
    /// The authority rejected the credentials
    AuthRejected,
    /// The principal signed out
    PrincipalCleared,
    /// The consistency validator fixed corrupted state
    Repaired,
}

/// A status notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub privileged: bool,
    /// Last-known status before this notification.
    pub previous: Option<bool>,
    pub cause: ChangeCause,
    pub at: DateTime<Utc>,
}

impl StatusChange {
    pub fn new(privileged: bool, previous: Option<bool>, cause: ChangeCause) -> Self {
        Self {
            privileged,
            previous,
            cause,
            at: Utc::now(),
        }
    }

    /// True when the value differs from what was known before.
    pub fn is_transition(&self) -> bool {
        self.previous != Some(self.privileged)
    }
}

pub struct ListenerRegistry {
    listeners: RwLock<BTreeMap<SubscriptionId, Listener>>,
    tx: broadcast::Sender<StatusChange>,
}

impl ListenerRegistry {
    pub fn new(channel_capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(channel_capacity.max(1));
        Self {
            listeners: RwLock::new(BTreeMap::new()),
            tx,
        }
    }

    pub fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        debug!(subscription = %id, "Listener subscribed");
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some();
        debug!(subscription = %id, removed, "Listener unsubscribed");
        removed
    }

    /// Receiver for the broadcast path.
    pub fn changes(&self) -> broadcast::Receiver<StatusChange> {
        self.tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a notification to every listener, then to the channel.
    ///
    /// Listeners run outside the registry lock, so a listener may subscribe
    /// or unsubscribe without deadlocking.
    pub fn notify(&self, change: StatusChange) {
        let listeners: Vec<(SubscriptionId, Listener)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        for (id, listener) in listeners {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener(&change)));
            if outcome.is_err() {
                error!(
                    subscription = %id,
                    privileged = change.privileged,
                    "Status listener panicked"
                );
            }
        }

        let cause = change.cause;
        match self.tx.send(change) {
            Ok(receivers) => {
                debug!(cause = ?cause, receivers, "Broadcast status change");
            }
            Err(_) => {
                debug!(cause = ?cause, "No receivers for status change");
            }
        }
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .field("receivers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<bool>>>, Listener) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: Listener = Arc::new(move |change: &StatusChange| {
            sink.lock().unwrap().push(change.privileged);
        });
        (seen, listener)
    }

    #[test]
    fn test_notify_reaches_all_listeners() {
        let registry = ListenerRegistry::new(8);
        let (first, a) = recorder();
        let (second, b) = recorder();
        registry.subscribe(a);
        registry.subscribe(b);

        registry.notify(StatusChange::new(true, None, ChangeCause::LookupSucceeded));

        assert_eq!(*first.lock().unwrap(), vec![true]);
        assert_eq!(*second.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_unsubscribe() {
        let registry = ListenerRegistry::new(8);
        let (seen, listener) = recorder();
        let id = registry.subscribe(listener);
        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        assert!(registry.is_empty());

        registry.notify(StatusChange::new(true, None, ChangeCause::LookupSucceeded));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let registry = ListenerRegistry::new(8);
        registry.subscribe(Arc::new(|_: &StatusChange| panic!("listener bug")));
        let (seen, listener) = recorder();
        registry.subscribe(listener);

        registry.notify(StatusChange::new(false, Some(true), ChangeCause::AuthRejected));

        assert_eq!(*seen.lock().unwrap(), vec![false]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_listener_may_unsubscribe_itself() {
        let registry = Arc::new(ListenerRegistry::new(8));
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let registry_ref = Arc::clone(&registry);
        let slot_ref = Arc::clone(&slot);
        let id = registry.subscribe(Arc::new(move |_: &StatusChange| {
            if let Some(id) = *slot_ref.lock().unwrap() {
                registry_ref.unsubscribe(id);
            }
        }));
        *slot.lock().unwrap() = Some(id);

        registry.notify(StatusChange::new(true, None, ChangeCause::LookupSucceeded));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_receives_changes() {
        let registry = ListenerRegistry::new(8);
        let mut rx = registry.changes();

        registry.notify(StatusChange::new(true, Some(false), ChangeCause::LookupSucceeded));

        let change = rx.recv().await.unwrap();
        assert!(change.privileged);
        assert_eq!(change.previous, Some(false));
        assert!(change.is_transition());
        assert_eq!(change.cause, ChangeCause::LookupSucceeded);
    }

    #[test]
    fn test_repeat_notification_is_not_transition() {
        let change = StatusChange::new(true, Some(true), ChangeCause::LookupSucceeded);
        assert!(!change.is_transition());
    }
}
