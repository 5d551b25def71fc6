//! WARDEN Status - Privilege status cache and request coordination
//!
//! Answers "is the current principal privileged?" quickly and consistently
//! while the authority behind the answer is slow or failing:
//!
//! - A time-boxed cache plus a last-known value that survives expiry
//! - Single-flight lookups: concurrent callers share one network request
//! - Classified failures with exponential backoff and a grace window
//! - Hard-clear on authentication rejection
//! - Background refresh ahead of expiry and a periodic consistency sweep
//! - Change notifications via callbacks or a broadcast channel

mod cache;
mod coordinator;
mod engine;
mod grace;
mod history;
mod listeners;
mod metrics;
mod refresh;
mod snapshot;
mod state;
mod validator;

pub use cache::StatusCache;
pub use engine::{StatusEngine, StatusEngineBuilder};
pub use grace::GracePeriod;
pub use history::{ErrorHistory, ErrorRecord};
pub use listeners::{ChangeCause, Listener, ListenerRegistry, StatusChange, SubscriptionId};
pub use metrics::{MetricsSnapshot, StatusMetrics};
pub use snapshot::{CacheSnapshot, DebugSnapshot, InFlightSnapshot};
pub use validator::Repair;

pub use warden_core::{
    AuthorityStatus, AuthorityTransport, ErrorKind, SessionSignal, StatusConfig, StatusError,
    StatusResult, TransportError,
};
