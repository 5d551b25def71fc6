//! Error types for WARDEN operations

use thiserror::Error;

/// Failure reported by an authority transport.
///
/// This is the failure descriptor the classifier works from: either an
/// HTTP-like status, one of the well-known transport conditions, or an opaque
/// code/message pair for transports that only hand back strings.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Authority responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Authority request timed out: {message}")]
    Timeout { message: String },

    #[error("Failed to resolve authority host: {message}")]
    Dns { message: String },

    #[error("Authority refused the connection: {message}")]
    ConnectionRefused { message: String },

    #[error("Network failure: {message}")]
    Network { message: String },

    #[error("Transport failure ({code:?}): {message}")]
    Other {
        code: Option<String>,
        message: String,
    },
}

impl TransportError {
    /// Shorthand for an HTTP status failure.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Shorthand for a connectivity failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Shorthand for a deadline failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// The HTTP status, if this failure carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Master error type for the status engine.
///
/// Lookups resolve to a boolean in nearly every case; these variants cover
/// the genuinely unexpected paths.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StatusError {
    #[error("Status engine requires a running tokio runtime")]
    NoRuntime,

    #[error("Lookup task failed: {reason}")]
    LookupTask { reason: String },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for status engine operations.
pub type StatusResult<T> = Result<T, StatusError>;

// =============================================================================
// TESTS
// =============================================================================
