//! Error types for the WARDEN client.

use crate::config::ConfigError;
use warden_core::StatusError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Status engine error: {0}")]
    Status(#[from] StatusError),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to initialize logging: {reason}")]
    Telemetry { reason: String },
}

pub type ClientResult<T> = Result<T, ClientError>;
