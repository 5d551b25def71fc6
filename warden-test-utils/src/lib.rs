//! WARDEN Test Utilities
//!
//! Shared test infrastructure for the WARDEN workspace:
//! - A scripted mock authority transport
//! - Session signal stubs
//! - Proptest generators for failures and authority payloads
//! - Fixtures and assertions for retry timing

pub use warden_core::{
    AuthorityStatus, AuthorityTransport, ErrorKind, SessionSignal, StatusConfig, TransportError,
};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

// ============================================================================
// MOCK AUTHORITY
// ============================================================================

pub type AuthorityResponse = Result<AuthorityStatus, TransportError>;

/// Scripted authority transport.
///
/// Scripted responses are consumed in order; once the script runs out every
/// call returns the fallback response. Each call is counted and timestamped
/// with tokio's clock so paused-time tests can check backoff spacing.
#[derive(Debug)]
pub struct MockAuthority {
    script: Mutex<VecDeque<AuthorityResponse>>,
    fallback: Mutex<AuthorityResponse>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
}

impl MockAuthority {
    /// Every call returns `response`.
    pub fn always(response: AuthorityResponse) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(response),
            delay: None,
            calls: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    pub fn privileged() -> Self {
        Self::always(Ok(AuthorityStatus::privileged()))
    }

    pub fn unprivileged() -> Self {
        Self::always(Ok(AuthorityStatus::unprivileged()))
    }

    pub fn failing(error: TransportError) -> Self {
        Self::always(Err(error))
    }

    /// Delay every response by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a response ahead of the fallback.
    pub fn then(self, response: AuthorityResponse) -> Self {
        self.push(response);
        self
    }

    pub fn push(&self, response: AuthorityResponse) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    pub fn set_fallback(&self, response: AuthorityResponse) {
        *self.fallback.lock().unwrap_or_else(PoisonError::into_inner) = response;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.call_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_response(&self) -> AuthorityResponse {
        let scripted = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        scripted.unwrap_or_else(|| {
            self.fallback
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        })
    }
}

#[async_trait]
impl AuthorityTransport for MockAuthority {
    async fn fetch_status(&self) -> Result<AuthorityStatus, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Instant::now());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_response()
    }
}

/// Session signal with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticSession(pub bool);

impl SessionSignal for StaticSession {
    fn has_plausible_session(&self) -> bool {
        self.0
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for transport failures and authority payloads.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_authority_status() -> impl Strategy<Value = AuthorityStatus> {
        (any::<bool>(), any::<bool>())
            .prop_map(|(authenticated, privileged)| AuthorityStatus::new(authenticated, privileged))
    }

    pub fn arb_message() -> impl Strategy<Value = String> {
        "[a-z ]{0,24}"
    }

    /// Failures the classifier treats as transient infrastructure problems.
    pub fn arb_transient_failure() -> impl Strategy<Value = TransportError> {
        prop_oneof![
            arb_message().prop_map(TransportError::network),
            arb_message().prop_map(TransportError::timeout),
            (500u16..600, arb_message()).prop_map(|(status, msg)| TransportError::status(status, msg)),
            arb_message().prop_map(|message| TransportError::Dns { message }),
            arb_message().prop_map(|message| TransportError::ConnectionRefused { message }),
        ]
    }

    /// Client-side HTTP failures other than 401/403/408/429.
    pub fn arb_client_failure() -> impl Strategy<Value = TransportError> {
        (400u16..500)
            .prop_filter("auth, timeout and rate limit have their own kinds", |status| {
                !matches!(status, 401 | 403 | 408 | 429)
            })
            .prop_map(|status| TransportError::status(status, "client error"))
    }

    pub fn arb_auth_failure() -> impl Strategy<Value = TransportError> {
        prop_oneof![Just(401u16), Just(403u16)]
            .prop_map(|status| TransportError::status(status, "unauthorized"))
    }

    pub fn arb_failure() -> impl Strategy<Value = TransportError> {
        prop_oneof![
            arb_transient_failure(),
            arb_client_failure(),
            arb_auth_failure(),
            Just(TransportError::status(429, "too many requests")),
            arb_message().prop_map(|message| TransportError::Other { code: None, message }),
        ]
    }

    pub fn arb_error_kind() -> impl Strategy<Value = ErrorKind> {
        proptest::sample::select(ErrorKind::ALL.to_vec())
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

/// Default config with jitter disabled, so backoff delays are exact.
pub fn test_config() -> StatusConfig {
    StatusConfig::default().with_jitter(0.0)
}

pub mod fixtures {
    //! Canned responses.

    use super::*;

    pub fn network_error() -> TransportError {
        TransportError::network("connection reset by peer")
    }

    pub fn unauthorized() -> TransportError {
        TransportError::status(401, "unauthorized")
    }

    pub fn rate_limited() -> TransportError {
        TransportError::status(429, "too many requests")
    }

    pub fn bad_request() -> TransportError {
        TransportError::status(400, "bad request")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over recorded call timing.

    use super::*;

    /// Gaps between consecutive call times.
    pub fn gaps(times: &[Instant]) -> Vec<Duration> {
        times
            .windows(2)
            .map(|pair| pair[1].saturating_duration_since(pair[0]))
            .collect()
    }

    /// Assert the spacing between calls never shrinks.
    pub fn assert_non_decreasing_gaps(times: &[Instant]) {
        let gaps = gaps(times);
        for pair in gaps.windows(2) {
            assert!(
                pair[1] >= pair[0],
                "backoff shrank from {:?} to {:?} (gaps: {:?})",
                pair[0],
                pair[1],
                gaps
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
