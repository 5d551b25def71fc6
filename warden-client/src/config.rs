//! Configuration loading for the WARDEN probe.
//!
//! Connection fields are required. The `[status]` section is optional and
//! only overrides what it names; everything else comes from the `WARDEN_*`
//! environment or the engine defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use warden_core::{SessionSignal, StatusConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeConfig {
    pub authority_url: String,
    pub request_timeout_ms: u64,
    pub auth: AuthConfig,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub status: StatusOverrides,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub api_key: Option<String>,
    pub jwt: Option<String>,
    /// Operator assertion that the configured credentials belong to a live
    /// session. Only consulted by the optimistic fallback; a token being
    /// present is not enough on its own.
    #[serde(default)]
    pub plausible_session: bool,
}

impl SessionSignal for AuthConfig {
    fn has_plausible_session(&self) -> bool {
        self.plausible_session
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusOverrides {
    pub cache_timeout_ms: Option<u64>,
    pub grace_period_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub validation_interval_ms: Option<u64>,
    pub optimistic_fallback: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or WARDEN_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ProbeConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ProbeConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.authority_url.trim();
        if url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "authority_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "authority_url",
                reason: "must be an http:// or https:// URL".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.auth.api_key.is_none() && self.auth.jwt.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "auth",
                reason: "api_key or jwt must be provided".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Engine config: environment and defaults, then the `[status]` section.
    pub fn status_config(&self) -> StatusConfig {
        self.status.apply(StatusConfig::from_env())
    }
}

impl StatusOverrides {
    pub fn apply(&self, mut config: StatusConfig) -> StatusConfig {
        if let Some(ms) = self.cache_timeout_ms {
            config = config.with_cache_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.grace_period_ms {
            config = config.with_grace_period(Duration::from_millis(ms));
        }
        if let Some(max_retries) = self.max_retries {
            config = config.with_max_retries(max_retries);
        }
        if let Some(ms) = self.validation_interval_ms {
            config = config.with_validation_interval(Duration::from_millis(ms));
        }
        if let Some(enabled) = self.optimistic_fallback {
            config = config.with_optimistic_fallback(enabled);
        }
        config
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("WARDEN_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
authority_url = "https://auth.example.com/api/session/status"
request_timeout_ms = 5000

[auth]
api_key = "test-key"
"#;

    #[test]
    fn test_minimal_config() {
        let config = ProbeConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.auth.api_key.as_deref(), Some("test-key"));
        assert!(config.auth.jwt.is_none());
        assert!(!config.auth.has_plausible_session());
    }

    #[test]
    fn test_status_overrides() {
        let contents = format!(
            "{MINIMAL}\n[status]\ncache_timeout_ms = 60000\nmax_retries = 5\noptimistic_fallback = true\n"
        );
        let config = ProbeConfig::from_toml(&contents).unwrap();
        let status = config.status.apply(StatusConfig::default());
        assert_eq!(status.cache_timeout, Duration::from_secs(60));
        assert_eq!(status.max_retries, 5);
        assert!(status.optimistic_fallback);
        assert_eq!(status.grace_period, Duration::from_secs(30));
    }

    #[test]
    fn test_token_alone_is_not_a_session() {
        let contents = format!("{MINIMAL}jwt = \"token\"\n");
        let config = ProbeConfig::from_toml(&contents).unwrap();
        assert!(config.auth.jwt.is_some());
        assert!(!config.auth.has_plausible_session());

        let contents = format!("{MINIMAL}jwt = \"token\"\nplausible_session = true\n");
        let config = ProbeConfig::from_toml(&contents).unwrap();
        assert!(config.auth.has_plausible_session());
    }

    #[test]
    fn test_json_log_format() {
        let contents = MINIMAL.replace(
            "request_timeout_ms = 5000",
            "request_timeout_ms = 5000\nlog_format = \"json\"",
        );
        let config = ProbeConfig::from_toml(&contents).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let contents = format!("{MINIMAL}\n[status]\ncache_ttl = 5\n");
        assert!(matches!(
            ProbeConfig::from_toml(&contents),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let contents = MINIMAL.replace("api_key = \"test-key\"", "");
        assert!(matches!(
            ProbeConfig::from_toml(&contents),
            Err(ConfigError::InvalidValue { field: "auth", .. })
        ));
    }

    #[test]
    fn test_non_http_url_rejected() {
        let contents = MINIMAL.replace("https://", "ftp://");
        assert!(matches!(
            ProbeConfig::from_toml(&contents),
            Err(ConfigError::InvalidValue {
                field: "authority_url",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let contents = MINIMAL.replace("5000", "0");
        assert!(matches!(
            ProbeConfig::from_toml(&contents),
            Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_from_path() {
        let path = std::env::temp_dir().join(format!("warden-probe-{}.toml", std::process::id()));
        std::fs::write(&path, MINIMAL).unwrap();
        let config = ProbeConfig::from_path(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(config.is_ok());

        assert!(matches!(
            ProbeConfig::from_path(Path::new("/nonexistent/warden.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
