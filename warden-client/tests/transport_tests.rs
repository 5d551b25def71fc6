//! HttpAuthority against a canned local HTTP server.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use warden_client::{HttpAuthority, ProbeConfig};
use warden_core::{classify, AuthorityStatus, AuthorityTransport, ErrorKind, TransportError};
use warden_status::StatusEngine;

// ============================================================================
// TEST SERVER
// ============================================================================

/// Serve one canned response and hand back the raw request head.
async fn serve_once(status_line: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
    });

    (format!("http://{}/api/session/status", addr), rx)
}

fn probe_config(url: &str) -> ProbeConfig {
    ProbeConfig::from_toml(&format!(
        r#"
authority_url = "{url}"
request_timeout_ms = 2000

[auth]
api_key = "probe-key"
jwt = "probe-token"
"#
    ))
    .unwrap()
}

// ============================================================================
// TESTS
// ============================================================================

#[tokio::test]
async fn test_privileged_response() {
    let (url, request) = serve_once("200 OK", r#"{"isAuthenticated":true,"isPrivileged":true}"#).await;
    let authority = HttpAuthority::new(&probe_config(&url)).unwrap();

    let status = authority.fetch_status().await;
    assert_eq!(status, Ok(AuthorityStatus::privileged()));

    let request = request.await.unwrap().to_ascii_lowercase();
    assert!(request.starts_with("get /api/session/status http/1.1"));
    assert!(request.contains("x-api-key: probe-key"));
    assert!(request.contains("authorization: bearer probe-token"));
}

#[tokio::test]
async fn test_unauthorized_maps_to_auth_kind() {
    let (url, _request) = serve_once("401 Unauthorized", r#"{"error":"session expired"}"#).await;
    let authority = HttpAuthority::new(&probe_config(&url)).unwrap();

    let err = authority.fetch_status().await.unwrap_err();
    assert_eq!(err.status_code(), Some(401));
    assert_eq!(classify(&err).kind, ErrorKind::Auth);
}

#[tokio::test]
async fn test_server_error_is_retryable() {
    let (url, _request) = serve_once("503 Service Unavailable", "").await;
    let authority = HttpAuthority::new(&probe_config(&url)).unwrap();

    let err = authority.fetch_status().await.unwrap_err();
    assert_eq!(err, TransportError::status(503, "Service Unavailable"));
    assert!(classify(&err).retryable);
}

#[tokio::test]
async fn test_malformed_body_fails_closed() {
    let (url, _request) = serve_once("200 OK", "<html>not json</html>").await;
    let authority = HttpAuthority::new(&probe_config(&url)).unwrap();

    let status = authority.fetch_status().await.unwrap();
    assert!(!status.is_privileged);
    assert!(!status.is_authenticated);
}

#[tokio::test]
async fn test_refused_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = format!("http://{}/api/session/status", addr);
    let authority = HttpAuthority::new(&probe_config(&url)).unwrap();

    let err = authority.fetch_status().await.unwrap_err();
    assert!(
        matches!(err, TransportError::ConnectionRefused { .. }),
        "unexpected failure: {err:?}"
    );
    assert_eq!(classify(&err).kind, ErrorKind::ConnectionRefused);
}

#[tokio::test]
async fn test_engine_over_http() {
    let (url, _request) = serve_once("200 OK", r#"{"isAuthenticated":true,"isPrivileged":true}"#).await;
    let config = probe_config(&url);
    let authority = HttpAuthority::new(&config).unwrap();

    let engine = StatusEngine::start(Arc::new(authority), config.status.apply(Default::default())).unwrap();
    assert_eq!(engine.lookup().await, Ok(true));
    // Served from cache: the server only answers once.
    assert_eq!(engine.lookup().await, Ok(true));
    assert_eq!(engine.metrics().transport_calls, 1);
    engine.shutdown();
}
