//! HttpTransport against a scripted local HTTP server.

#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use std::sync::Arc;
use tio_core::{
    ApiError, ApiRequest, ApiSession, Cassette, CassetteTransport, ClientConfig, HttpMethod,
    HttpTransport, RecordingTransport, Transport,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Serves the canned responses in order, one per connection, and reports
/// every raw request it receives.
async fn scripted_server(responses: Vec<String>) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let raw = read_request(&mut socket).await;
            tx.send(raw).ok();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
    });

    (format!("http://{}", addr), rx)
}

/// Reads the head and, when announced, the full body of one request.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut data = Vec::new();
    let mut buffer = vec![0; 4096];
    loop {
        let n = socket.read(&mut buffer).await.unwrap();
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..n]);

        let text = String::from_utf8_lossy(&data).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).to_string()
}

fn http_response(status_line: &str, extra_headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
        status_line,
        body.len(),
        extra_headers,
        body
    )
}

fn config_for(url: String, max_retries: u32) -> ClientConfig {
    let mut config = ClientConfig::new("test-access", "test-secret");
    config.url = url;
    config.max_retries = max_retries;
    config.backoff_ms = 10;
    config.timeout_secs = 5;
    config
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn test_retries_unavailable_then_succeeds() {
    init_tracing();
    let (url, mut requests) = scripted_server(vec![
        http_response("503 Service Unavailable", "", r#"{"error":"busy"}"#),
        http_response("200 OK", "", r#"{"permission_uuid":"abc"}"#),
    ])
    .await;

    let transport = HttpTransport::new(&config_for(url, 2)).unwrap();
    let response = transport
        .execute(ApiRequest::new(HttpMethod::Get, "/api/v3/access-control/permissions/abc"))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, Some(json!({"permission_uuid": "abc"})));

    let first = requests.recv().await.unwrap();
    assert!(first.starts_with("GET /api/v3/access-control/permissions/abc HTTP/1.1"));
    assert!(first
        .to_lowercase()
        .contains("x-apikeys: accesskey=test-access;secretkey=test-secret"));
    assert!(requests.recv().await.is_some());
}

#[tokio::test]
async fn test_gives_up_after_max_retries() {
    init_tracing();
    let (url, _requests) = scripted_server(vec![
        http_response("429 Too Many Requests", "Retry-After: 0\r\n", r#"{"error":"slow down"}"#),
        http_response("429 Too Many Requests", "Retry-After: 0\r\n", r#"{"error":"slow down"}"#),
    ])
    .await;

    let session = ApiSession::new(Arc::new(HttpTransport::new(&config_for(url, 1)).unwrap()));
    match session.get::<serde_json::Value>("/api/v3/things").await {
        Err(ApiError::RateLimited(msg)) => assert_eq!(msg, "slow down"),
        other => panic!("Expected RateLimited, got {:?}", other),
    }
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    init_tracing();
    let (url, mut requests) = scripted_server(vec![http_response(
        "404 Not Found",
        "",
        r#"{"error":"Permission not found"}"#,
    )])
    .await;

    let session = ApiSession::new(Arc::new(HttpTransport::new(&config_for(url, 3)).unwrap()));
    match session.get::<serde_json::Value>("/api/v3/things/1").await {
        Err(ApiError::NotFound(msg)) => assert_eq!(msg, "Permission not found"),
        other => panic!("Expected NotFound, got {:?}", other),
    }
    assert!(requests.recv().await.is_some());
    assert!(requests.try_recv().is_err());
}

#[tokio::test]
async fn test_post_body_and_empty_response() {
    init_tracing();
    let (url, mut requests) = scripted_server(vec![http_response("200 OK", "", "")]).await;

    let session = ApiSession::new(Arc::new(HttpTransport::new(&config_for(url, 0)).unwrap()));
    session
        .put("/api/v3/things/1", &json!({"name": "renamed"}))
        .await
        .unwrap();

    let raw = requests.recv().await.unwrap();
    assert!(raw.starts_with("PUT /api/v3/things/1 HTTP/1.1"));
    assert!(raw.contains(r#"{"name":"renamed"}"#));
}

#[tokio::test]
async fn test_recorded_traffic_replays() {
    init_tracing();
    let (url, _requests) = scripted_server(vec![
        http_response("200 OK", "", r#"{"permissions":[]}"#),
        http_response("404 Not Found", "", r#"{"error":"missing"}"#),
    ])
    .await;

    let recorder = RecordingTransport::new(HttpTransport::new(&config_for(url, 0)).unwrap());
    recorder
        .execute(ApiRequest::new(HttpMethod::Get, "/api/v3/things"))
        .await
        .unwrap();
    recorder
        .execute(ApiRequest::new(HttpMethod::Get, "/api/v3/things/1"))
        .await
        .unwrap();

    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("things.yaml");
    recorder.save(&path).unwrap();

    let yaml = std::fs::read_to_string(&path).unwrap();
    assert!(!yaml.contains("test-secret"));

    let replay = CassetteTransport::new(Cassette::load(&path).unwrap());
    let missing = replay
        .execute(ApiRequest::new(HttpMethod::Get, "/api/v3/things/1"))
        .await
        .unwrap();
    assert_eq!(missing.status, 404);
    let listed = replay
        .execute(ApiRequest::new(HttpMethod::Get, "/api/v3/things"))
        .await
        .unwrap();
    assert_eq!(listed.body, Some(json!({"permissions": []})));
    assert_eq!(replay.remaining(), 0);
}

/// Accepts connections and never answers, reporting each accept.
async fn silent_server() -> (String, mpsc::UnboundedReceiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
            if tx.send(()).is_err() {
                break;
            }
        }
    });

    (format!("http://{}", addr), rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<()>) -> usize {
    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    count
}

#[tokio::test]
async fn test_refused_connection_is_retried_then_surfaced() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let mut config = config_for(url, 1);
    config.backoff_ms = 200;
    let transport = HttpTransport::new(&config).unwrap();

    let started = std::time::Instant::now();
    let result = transport
        .execute(ApiRequest::new(HttpMethod::Post, "/api/v3/access-control/permissions"))
        .await;

    match result {
        Err(ApiError::Transport(msg)) => assert!(msg.contains("POST")),
        other => panic!("Expected Transport error, got {:?}", other),
    }
    // one backoff sleep means a second attempt was made
    assert!(started.elapsed() >= std::time::Duration::from_millis(200));
}

#[tokio::test]
async fn test_timed_out_reads_are_retried() {
    init_tracing();
    let (url, mut accepted) = silent_server().await;

    let mut config = config_for(url, 1);
    config.timeout_secs = 1;
    let transport = HttpTransport::new(&config).unwrap();

    let result = transport
        .execute(ApiRequest::new(HttpMethod::Get, "/api/v3/access-control/permissions"))
        .await;

    assert!(matches!(result, Err(ApiError::Transport(_))));
    assert_eq!(drain(&mut accepted), 2);
}

#[tokio::test]
async fn test_timed_out_create_is_not_repeated() {
    init_tracing();
    let (url, mut accepted) = silent_server().await;

    let mut config = config_for(url, 3);
    config.timeout_secs = 1;
    let transport = HttpTransport::new(&config).unwrap();

    let request = ApiRequest::new(HttpMethod::Post, "/api/v3/access-control/permissions")
        .with_body(json!({"name": "test_once", "actions": ["CanView"]}));
    let result = transport.execute(request).await;

    assert!(matches!(result, Err(ApiError::Transport(_))));
    assert_eq!(drain(&mut accepted), 1);
}

#[tokio::test]
async fn test_create_is_not_repeated_after_gateway_error() {
    init_tracing();
    let (url, mut requests) = scripted_server(vec![
        http_response("502 Bad Gateway", "", r#"{"error":"upstream"}"#),
        http_response("200 OK", "", r#"{"permission_uuid":"dup"}"#),
    ])
    .await;

    let transport = HttpTransport::new(&config_for(url, 2)).unwrap();
    let response = transport
        .execute(ApiRequest::new(HttpMethod::Post, "/api/v3/access-control/permissions"))
        .await
        .unwrap();

    assert_eq!(response.status, 502);
    assert!(requests.recv().await.is_some());
    assert!(requests.try_recv().is_err());
}
