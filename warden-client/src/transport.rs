//! HTTP transport for the authority status endpoint.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use std::error::Error as StdError;

use warden_core::{AuthorityStatus, AuthorityTransport, TransportError};

use crate::config::{AuthConfig, ConfigError, ProbeConfig};
use crate::error::ClientResult;

/// Longest response body excerpt carried into a failure message.
const MAX_BODY_EXCERPT: usize = 256;

/// One GET per call against the configured status URL.
///
/// The client never retries and never follows up on a failure; the status
/// engine owns that.
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl HttpAuthority {
    pub fn new(config: &ProbeConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        let headers = build_auth_headers(&config.auth)?;
        Ok(Self {
            client,
            url: config.authority_url.trim().to_string(),
            headers,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AuthorityTransport for HttpAuthority {
    async fn fetch_status(&self) -> Result<AuthorityStatus, TransportError> {
        let response = self
            .client
            .get(&self.url)
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_failure(status, &body));
        }

        let body = response.bytes().await.map_err(map_request_error)?;
        Ok(AuthorityStatus::from_slice(&body))
    }
}

fn build_auth_headers(auth: &AuthConfig) -> Result<HeaderMap, ConfigError> {
    let invalid = |e: reqwest::header::InvalidHeaderValue| ConfigError::InvalidValue {
        field: "auth",
        reason: e.to_string(),
    };

    let mut headers = HeaderMap::new();
    if let Some(api_key) = &auth.api_key {
        headers.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(api_key).map_err(invalid)?,
        );
    }
    if let Some(jwt) = &auth.jwt {
        let value = format!("Bearer {}", jwt);
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&value).map_err(invalid)?,
        );
    }
    Ok(headers)
}

/// Failure for a non-2xx response.
pub(crate) fn status_failure(status: StatusCode, body: &str) -> TransportError {
    let body = body.trim();
    let message = if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string()
    } else {
        body.chars().take(MAX_BODY_EXCERPT).collect()
    };
    TransportError::status(status.as_u16(), message)
}

fn map_request_error(err: reqwest::Error) -> TransportError {
    let message = err.to_string();
    if err.is_timeout() {
        return TransportError::Timeout { message };
    }
    if err.is_connect() {
        let mut source = err.source();
        while let Some(cause) = source {
            if let Some(io) = cause.downcast_ref::<std::io::Error>() {
                if io.kind() == std::io::ErrorKind::ConnectionRefused {
                    return TransportError::ConnectionRefused { message };
                }
            }
            let text = cause.to_string().to_ascii_lowercase();
            if text.contains("dns") || text.contains("resolve") {
                return TransportError::Dns { message };
            }
            if text.contains("refused") {
                return TransportError::ConnectionRefused { message };
            }
            source = cause.source();
        }
        return TransportError::Network { message };
    }
    if err.is_request() || err.is_body() {
        return TransportError::Network { message };
    }
    TransportError::Other {
        code: None,
        message,
    }
}
