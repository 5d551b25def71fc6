//! Default values for the status engine.
//!
//! Centralized here so config defaults, env parsing and tests agree.

// ============================================================================
// CACHE
// ============================================================================

/// How long an authoritative answer stays valid (5 minutes)
pub const DEFAULT_CACHE_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// Base grace window after a transient failure (30 seconds)
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 30_000;

// ============================================================================
// RETRY
// ============================================================================

/// Retries per logical lookup (so at most 4 transport calls)
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// First backoff delay
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Exponential growth factor between attempts
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Upper bound for any single backoff delay
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Relative jitter applied to each delay (±25%)
pub const DEFAULT_JITTER: f64 = 0.25;

/// Lower bound for any single backoff delay
pub const DEFAULT_MIN_DELAY_MS: u64 = 100;

/// Lower bound for backoff after a rate-limit response
pub const DEFAULT_RATE_LIMIT_MIN_DELAY_MS: u64 = 5_000;

// ============================================================================
// TIMERS
// ============================================================================

/// Background refresh fires this long before the cache expires
pub const DEFAULT_REFRESH_LEAD_MS: u64 = 30_000;

/// Background refresh never fires sooner than this after a success
pub const DEFAULT_REFRESH_MIN_DELAY_MS: u64 = 1_000;

/// Consistency sweep interval
pub const DEFAULT_VALIDATION_INTERVAL_MS: u64 = 60_000;

// ============================================================================
// DIAGNOSTICS
// ============================================================================

/// Failures retained for inspection
pub const DEFAULT_ERROR_HISTORY_CAPACITY: usize = 50;

/// Buffered change events per broadcast receiver
pub const DEFAULT_CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Upper bound accepted for `max_retries`
pub const MAX_RETRIES_LIMIT: u32 = 10;
