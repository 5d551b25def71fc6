//! Authority contracts: the status payload, the transport trait, and the
//! identity provider's session signal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// Status reported by the authority endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorityStatus {
    pub is_authenticated: bool,
    pub is_privileged: bool,
}

impl AuthorityStatus {
    pub fn new(is_authenticated: bool, is_privileged: bool) -> Self {
        Self {
            is_authenticated,
            is_privileged,
        }
    }

    /// A privileged, authenticated principal.
    pub fn privileged() -> Self {
        Self::new(true, true)
    }

    /// An authenticated principal without privilege.
    pub fn unprivileged() -> Self {
        Self::new(true, false)
    }

    /// Interpret a raw payload, failing closed.
    ///
    /// Anything that is not an object with boolean fields reads as `false`.
    /// A missing or non-boolean `isPrivileged` never grants privilege.
    pub fn from_payload(payload: &Value) -> Self {
        let flag = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };
        Self {
            is_authenticated: flag("isAuthenticated"),
            is_privileged: flag("isPrivileged"),
        }
    }

    /// Interpret raw response bytes, failing closed on malformed JSON.
    pub fn from_slice(body: &[u8]) -> Self {
        serde_json::from_slice::<Value>(body)
            .map(|payload| Self::from_payload(&payload))
            .unwrap_or_default()
    }
}

/// Transport that performs the authoritative status request.
///
/// Implementations make exactly one request per call and never retry on
/// their own; retry and backoff belong to the status engine.
#[async_trait]
pub trait AuthorityTransport: Send + Sync {
    /// Fetch the current status from the authority.
    async fn fetch_status(&self) -> Result<AuthorityStatus, TransportError>;
}

/// Signal from the identity provider that the caller holds a plausible session.
///
/// Only consulted when optimistic fallback is enabled and a lookup fails with
/// no last-known status to fall back on.
pub trait SessionSignal: Send + Sync {
    fn has_plausible_session(&self) -> bool;
}

/// Session signal that never vouches for the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSession;

impl SessionSignal for NoSession {
    fn has_plausible_session(&self) -> bool {
        false
    }
}
