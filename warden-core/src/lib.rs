//! WARDEN Core - Error taxonomy, retry policy and authority contracts
//!
//! Pure building blocks shared by the status engine and its transports:
//! failure classification, backoff computation, configuration, and the
//! traits an authority transport and identity provider implement.

pub mod authority;
pub mod classify;
pub mod config;
pub mod constants;
pub mod error;
pub mod retry;

pub use authority::{AuthorityStatus, AuthorityTransport, NoSession, SessionSignal};
pub use classify::{classify, Classification, ErrorKind, Severity};
pub use config::StatusConfig;
pub use error::{ConfigError, StatusError, StatusResult, TransportError};
pub use retry::{RetryPolicy, RetryState};
