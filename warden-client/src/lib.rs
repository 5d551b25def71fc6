//! WARDEN Client - HTTP authority transport and probe plumbing
//!
//! Connects a [`warden_status::StatusEngine`] to a real authority endpoint:
//! TOML configuration, a reqwest-backed [`HttpAuthority`], and tracing setup
//! for the `warden-probe` binary.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod transport;

pub use config::{AuthConfig, ConfigError, LogFormat, ProbeConfig, StatusOverrides};
pub use error::{ClientError, ClientResult};
pub use telemetry::init_tracing;
pub use transport::HttpAuthority;
