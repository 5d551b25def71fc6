//! Tracing subscriber setup for the probe.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogFormat;
use crate::error::{ClientError, ClientResult};

const DEFAULT_FILTER: &str = "warden_status=info,warden_client=info,warden_probe=info";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing(format: LogFormat) -> ClientResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    result.map_err(|e| ClientError::Telemetry {
        reason: e.to_string(),
    })
}
