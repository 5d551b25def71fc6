//! Property-Based Tests for Request Coordination
//!
//! **Property: Single-flight**
//! Any number of lookups issued before the first settles share one transport
//! call and observe the same result.
//!
//! **Property: Retry bound**
//! A persistently failing transient error costs exactly `max_retries + 1`
//! calls per lookup, with backoff that never shrinks.
//!
//! **Property: Fail-safe finalization**
//! Whatever the failure, a lookup resolves to a boolean; auth failures always
//! resolve `false` and never leave a grace window behind.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use proptest::prelude::*;
use tokio::runtime::Runtime;
use warden_core::{classify, ErrorKind};
use warden_status::{AuthorityStatus, StatusEngine, TransportError};
use warden_test_utils::{assertions, generators, test_config, MockAuthority};

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn paused_runtime() -> Result<Runtime, TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn start(mock: &Arc<MockAuthority>, max_retries: u32) -> StatusEngine {
    let config = test_config().with_max_retries(max_retries);
    StatusEngine::start(mock.clone(), config).unwrap()
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_concurrent_lookups_share_one_call(
        callers in 1usize..24,
        status in generators::arb_authority_status(),
        delay_ms in 1u64..500,
    ) {
        let rt = paused_runtime()?;
        let (results, calls) = rt.block_on(async {
            let mock = Arc::new(
                MockAuthority::always(Ok(status)).with_delay(Duration::from_millis(delay_ms)),
            );
            let engine = start(&mock, 3);
            let results = join_all((0..callers).map(|_| engine.lookup())).await;
            (results, mock.calls())
        });

        prop_assert_eq!(calls, 1);
        prop_assert_eq!(results.len(), callers);
        for result in results {
            prop_assert_eq!(result, Ok(status.is_privileged));
        }
    }

    #[test]
    fn prop_transient_failures_bounded(
        error in generators::arb_transient_failure(),
        max_retries in 0u32..5,
    ) {
        let rt = paused_runtime()?;
        let (resolved, calls, times) = rt.block_on(async {
            let mock = Arc::new(MockAuthority::failing(error));
            let engine = start(&mock, max_retries);
            let resolved = engine.lookup().await;
            (resolved, mock.calls(), mock.call_times())
        });

        prop_assert_eq!(resolved, Ok(false));
        prop_assert_eq!(calls, max_retries as usize + 1);
        assertions::assert_non_decreasing_gaps(&times);
    }

    #[test]
    fn prop_followers_joining_during_backoff_share_result(
        failures in 1usize..4,
        privileged in any::<bool>(),
    ) {
        let rt = paused_runtime()?;
        let (first, second, calls) = rt.block_on(async {
            let mock = MockAuthority::always(Ok(AuthorityStatus::new(true, privileged)));
            for _ in 0..failures {
                mock.push(Err(TransportError::timeout("deadline exceeded")));
            }
            let mock = Arc::new(mock);
            let engine = start(&mock, 3);

            let leader = {
                let engine = engine.clone();
                tokio::spawn(async move { engine.lookup().await })
            };
            tokio::time::sleep(Duration::from_millis(500)).await;
            let second = engine.lookup().await;
            let first = leader.await.unwrap();
            (first, second, mock.calls())
        });

        prop_assert_eq!(first, Ok(privileged));
        prop_assert_eq!(second, Ok(privileged));
        prop_assert_eq!(calls, failures + 1);
    }

    #[test]
    fn prop_any_failure_resolves_safely(error in generators::arb_failure()) {
        let rt = paused_runtime()?;
        let (resolved, snapshot) = rt.block_on(async {
            let mock = Arc::new(MockAuthority::privileged());
            let engine = start(&mock, 3);
            engine.lookup().await.unwrap();
            engine.invalidate();
            mock.set_fallback(Err(error.clone()));
            let resolved = engine.lookup().await;
            (resolved, engine.inspect())
        });

        let kind = classify(&error).kind;
        match kind {
            ErrorKind::Auth => {
                prop_assert_eq!(resolved, Ok(false));
                prop_assert!(!snapshot.grace_active);
                prop_assert_eq!(snapshot.last_known, Some(false));
            }
            ErrorKind::Client | ErrorKind::Unknown => {
                prop_assert_eq!(resolved, Ok(true));
                prop_assert!(!snapshot.grace_active);
            }
            _ => {
                prop_assert_eq!(resolved, Ok(true));
                prop_assert!(snapshot.grace_active);
            }
        }
        prop_assert!(snapshot.in_flight.is_none());
        prop_assert!(!snapshot.loading);
    }
}
