//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;

/// Runtime configuration for the status engine.
///
/// Defaults match the documented policy; use the `with_*` builders to tune a
/// single knob, and [`StatusConfig::validate`] before handing a hand-built
/// config to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusConfig {
    /// How long an authoritative answer is served without a new lookup.
    pub cache_timeout: Duration,
    /// Base grace window after a transient failure. Doubled for rate limits.
    pub grace_period: Duration,
    /// Retries per logical lookup.
    pub max_retries: u32,
    /// Backoff before the first retry.
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    /// Relative jitter in `[0, 1)`.
    pub jitter: f64,
    pub min_delay: Duration,
    pub rate_limit_min_delay: Duration,
    /// Background refresh fires this long before the cache would expire.
    pub refresh_lead: Duration,
    pub refresh_min_delay: Duration,
    /// Consistency sweep interval.
    pub validation_interval: Duration,
    pub error_history_capacity: usize,
    pub change_channel_capacity: usize,
    /// Resolve `true` on outage when the identity provider vouches for the
    /// session and no last-known status exists. Off unless explicitly enabled.
    pub optimistic_fallback: bool,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            cache_timeout: Duration::from_millis(DEFAULT_CACHE_TIMEOUT_MS),
            grace_period: Duration::from_millis(DEFAULT_GRACE_PERIOD_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter: DEFAULT_JITTER,
            min_delay: Duration::from_millis(DEFAULT_MIN_DELAY_MS),
            rate_limit_min_delay: Duration::from_millis(DEFAULT_RATE_LIMIT_MIN_DELAY_MS),
            refresh_lead: Duration::from_millis(DEFAULT_REFRESH_LEAD_MS),
            refresh_min_delay: Duration::from_millis(DEFAULT_REFRESH_MIN_DELAY_MS),
            validation_interval: Duration::from_millis(DEFAULT_VALIDATION_INTERVAL_MS),
            error_history_capacity: DEFAULT_ERROR_HISTORY_CAPACITY,
            change_channel_capacity: DEFAULT_CHANGE_CHANNEL_CAPACITY,
            optimistic_fallback: false,
        }
    }
}

impl StatusConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create StatusConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `WARDEN_CACHE_TIMEOUT_MS`: Cache validity window (default: 300000)
    /// - `WARDEN_GRACE_PERIOD_MS`: Base grace window (default: 30000)
    /// - `WARDEN_MAX_RETRIES`: Retries per lookup (default: 3)
    /// - `WARDEN_VALIDATION_INTERVAL_MS`: Consistency sweep interval (default: 60000)
    /// - `WARDEN_OPTIMISTIC_FALLBACK`: Enable optimistic outage fallback (default: false)
    pub fn from_env() -> Self {
        let millis = |key: &str, default: u64| {
            Duration::from_millis(
                std::env::var(key)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default),
            )
        };

        let max_retries = std::env::var("WARDEN_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);

        let optimistic_fallback = std::env::var("WARDEN_OPTIMISTIC_FALLBACK")
            .map(|s| s == "true" || s == "1")
            .unwrap_or(false);

        Self {
            cache_timeout: millis("WARDEN_CACHE_TIMEOUT_MS", DEFAULT_CACHE_TIMEOUT_MS),
            grace_period: millis("WARDEN_GRACE_PERIOD_MS", DEFAULT_GRACE_PERIOD_MS),
            max_retries,
            validation_interval: millis(
                "WARDEN_VALIDATION_INTERVAL_MS",
                DEFAULT_VALIDATION_INTERVAL_MS,
            ),
            optimistic_fallback,
            ..Self::default()
        }
    }

    /// Set the cache validity window.
    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    /// Set the base grace window.
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Set the retry budget per lookup.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the jitter ratio.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the consistency sweep interval.
    pub fn with_validation_interval(mut self, interval: Duration) -> Self {
        self.validation_interval = interval;
        self
    }

    /// Set the error history capacity.
    pub fn with_error_history(mut self, capacity: usize) -> Self {
        self.error_history_capacity = capacity;
        self
    }

    /// Enable or disable optimistic outage fallback.
    pub fn with_optimistic_fallback(mut self, enabled: bool) -> Self {
        self.optimistic_fallback = enabled;
        self
    }

    /// Delay between a successful lookup and its background refresh.
    pub fn refresh_delay(&self) -> Duration {
        self.cache_timeout
            .saturating_sub(self.refresh_lead)
            .max(self.refresh_min_delay)
    }

    /// Grace window after a rate-limit response.
    pub fn rate_limit_grace(&self) -> Duration {
        self.grace_period.saturating_mul(2)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_timeout.is_zero() {
            return Err(ConfigError::invalid("cache_timeout", "must be > 0"));
        }
        if self.grace_period.is_zero() {
            return Err(ConfigError::invalid("grace_period", "must be > 0"));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::invalid(
                "max_retries",
                format!("must be <= {}", MAX_RETRIES_LIMIT),
            ));
        }
        if self.base_delay.is_zero() {
            return Err(ConfigError::invalid("base_delay", "must be > 0"));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid("backoff_multiplier", "must be >= 1.0"));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(ConfigError::invalid("jitter", "must be within [0, 1)"));
        }
        if self.min_delay > self.max_delay {
            return Err(ConfigError::IncompatibleOptions {
                option_a: "min_delay".to_string(),
                option_b: "max_delay".to_string(),
            });
        }
        if self.refresh_min_delay.is_zero() {
            return Err(ConfigError::invalid("refresh_min_delay", "must be > 0"));
        }
        if self.validation_interval.is_zero() {
            return Err(ConfigError::invalid("validation_interval", "must be > 0"));
        }
        if self.error_history_capacity == 0 {
            return Err(ConfigError::invalid("error_history_capacity", "must be > 0"));
        }
        if self.change_channel_capacity == 0 {
            return Err(ConfigError::invalid("change_channel_capacity", "must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StatusConfig::default();
        assert_eq!(config.cache_timeout, Duration::from_secs(300));
        assert_eq!(config.grace_period, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.validation_interval, Duration::from_secs(60));
        assert_eq!(config.error_history_capacity, 50);
        assert!(!config.optimistic_fallback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_refresh_delay() {
        let config = StatusConfig::default();
        assert_eq!(config.refresh_delay(), Duration::from_secs(270));

        let short = StatusConfig::default().with_cache_timeout(Duration::from_secs(10));
        assert_eq!(short.refresh_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_rate_limit_grace_doubles() {
        let config = StatusConfig::default().with_grace_period(Duration::from_secs(45));
        assert_eq!(config.rate_limit_grace(), Duration::from_secs(90));
    }

    #[test]
    fn test_builder() {
        let config = StatusConfig::new()
            .with_cache_timeout(Duration::from_secs(60))
            .with_grace_period(Duration::from_secs(5))
            .with_max_retries(1)
            .with_jitter(0.0)
            .with_validation_interval(Duration::from_secs(5))
            .with_error_history(8)
            .with_optimistic_fallback(true);

        assert_eq!(config.cache_timeout, Duration::from_secs(60));
        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.jitter, 0.0);
        assert_eq!(config.error_history_capacity, 8);
        assert!(config.optimistic_fallback);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_cache = StatusConfig::default().with_cache_timeout(Duration::ZERO);
        assert!(zero_cache.validate().is_err());

        let too_many = StatusConfig::default().with_max_retries(11);
        assert!(too_many.validate().is_err());

        let bad_jitter = StatusConfig::default().with_jitter(1.0);
        assert!(bad_jitter.validate().is_err());

        let no_history = StatusConfig::default().with_error_history(0);
        assert!(no_history.validate().is_err());

        let inverted = StatusConfig {
            min_delay: Duration::from_secs(60),
            ..StatusConfig::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::IncompatibleOptions { .. })
        ));
    }
}
