//! Error classification.
//!
//! Maps a [`TransportError`] onto a fixed taxonomy. The taxonomy decides
//! whether a failure is retried, how it is logged, and which finalization
//! path the coordinator takes once retries stop.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TransportError;

/// Failure taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connectivity failure
    Network,
    /// Deadline exceeded
    Timeout,
    /// 5xx-equivalent
    Server,
    /// 429-equivalent
    RateLimit,
    /// 401/403-equivalent
    Auth,
    /// Other 4xx-equivalent
    Client,
    /// Host resolution failure
    Dns,
    /// Connect refused by the peer
    ConnectionRefused,
    /// Anything unrecognized
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::Network,
        ErrorKind::Timeout,
        ErrorKind::Server,
        ErrorKind::RateLimit,
        ErrorKind::Auth,
        ErrorKind::Client,
        ErrorKind::Dns,
        ErrorKind::ConnectionRefused,
        ErrorKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Server => "server",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Auth => "auth",
            ErrorKind::Client => "client",
            ErrorKind::Dns => "dns",
            ErrorKind::ConnectionRefused => "connection_refused",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Infrastructure failures that degrade to last-known status plus grace.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::Server
                | ErrorKind::Dns
                | ErrorKind::ConnectionRefused
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How loudly a failure should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Classifier output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub severity: Severity,
}

impl Classification {
    /// Fixed retry/severity policy for each kind.
    pub fn for_kind(kind: ErrorKind) -> Self {
        let (retryable, severity) = match kind {
            ErrorKind::Network => (true, Severity::High),
            ErrorKind::Timeout => (true, Severity::Medium),
            ErrorKind::Server => (true, Severity::High),
            ErrorKind::RateLimit => (true, Severity::Medium),
            ErrorKind::Auth => (false, Severity::Low),
            ErrorKind::Client => (false, Severity::Low),
            ErrorKind::Dns => (true, Severity::High),
            ErrorKind::ConnectionRefused => (true, Severity::High),
            ErrorKind::Unknown => (false, Severity::Medium),
        };
        Self {
            kind,
            retryable,
            severity,
        }
    }
}

/// Classify a transport failure.
pub fn classify(error: &TransportError) -> Classification {
    Classification::for_kind(kind_of(error))
}

fn kind_of(error: &TransportError) -> ErrorKind {
    match error {
        TransportError::Status { status, .. } => kind_for_status(*status),
        TransportError::Timeout { .. } => ErrorKind::Timeout,
        TransportError::Dns { .. } => ErrorKind::Dns,
        TransportError::ConnectionRefused { .. } => ErrorKind::ConnectionRefused,
        TransportError::Network { .. } => ErrorKind::Network,
        TransportError::Other { code, message } => code
            .as_deref()
            .and_then(kind_for_code)
            .unwrap_or_else(|| kind_for_message(message)),
    }
}

fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::Auth,
        429 => ErrorKind::RateLimit,
        408 => ErrorKind::Timeout,
        500..=599 => ErrorKind::Server,
        400..=499 => ErrorKind::Client,
        _ => ErrorKind::Unknown,
    }
}

fn kind_for_code(code: &str) -> Option<ErrorKind> {
    let kind = match code.to_ascii_uppercase().as_str() {
        "ENOTFOUND" | "EAI_AGAIN" => ErrorKind::Dns,
        "ECONNREFUSED" => ErrorKind::ConnectionRefused,
        "ETIMEDOUT" | "ESOCKETTIMEDOUT" | "ECONNABORTED" => ErrorKind::Timeout,
        "ECONNRESET" | "ENETUNREACH" | "EHOSTUNREACH" | "ENETDOWN" | "EPIPE" => {
            ErrorKind::Network
        }
        _ => return None,
    };
    Some(kind)
}

fn kind_for_message(message: &str) -> ErrorKind {
    let message = message.to_ascii_lowercase();
    if message.contains("timeout") || message.contains("timed out") {
        ErrorKind::Timeout
    } else if message.contains("dns")
        || message.contains("getaddrinfo")
        || message.contains("name resolution")
    {
        ErrorKind::Dns
    } else if message.contains("refused") {
        ErrorKind::ConnectionRefused
    } else if message.contains("network")
        || message.contains("connection")
        || message.contains("fetch")
    {
        ErrorKind::Network
    } else {
        ErrorKind::Unknown
    }
}
