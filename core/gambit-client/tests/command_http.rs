use gambit_client::{ClientConfig, ClientError, CommandClient, MemoryTokenStore, TokenStore};
use gambit_protocol::HealthStatus;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug)]
struct RecordedRequest {
    method: String,
    target: String,
    authorization: Option<String>,
    content_type: Option<String>,
    body: String,
}

const AUTH_BODY: &str = r#"{"access_token":"tok-123","token_type":"bearer","expires_in":3600,"user":{"id":"u1","username":"pilot","role":"operator"}}"#;
const HEALTH_BODY: &str = r#"{"cpu":12.5,"temp":48.0,"disk":30.0,"memory":41.0,"battery":87.0,"sat_fix":1.0,"fps":29.9,"status":"HEALTHY","timestamp":"2026-01-30T12:00:00Z"}"#;

fn read_request(stream: &mut TcpStream) -> RecordedRequest {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).expect("Failed to read request line");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();

    let mut content_length = 0usize;
    let mut chunked = false;
    let mut authorization = None;
    let mut content_type = None;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).expect("Failed to read header");
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse().unwrap_or(0);
            } else if name.eq_ignore_ascii_case("authorization") {
                authorization = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("content-type") {
                content_type = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("transfer-encoding") {
                chunked = value.eq_ignore_ascii_case("chunked");
            }
        }
    }

    let body = if chunked {
        read_chunked(&mut reader)
    } else {
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).expect("Failed to read body");
        body
    };
    RecordedRequest {
        method,
        target,
        authorization,
        content_type,
        body: String::from_utf8_lossy(&body).into_owned(),
    }
}

fn read_chunked<R: BufRead>(reader: &mut R) -> Vec<u8> {
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        reader.read_line(&mut size_line).expect("Failed to read chunk size");
        let size = usize::from_str_radix(size_line.trim(), 16).expect("Invalid chunk size");
        let mut chunk = vec![0u8; size + 2];
        reader.read_exact(&mut chunk).expect("Failed to read chunk");
        if size == 0 {
            return body;
        }
        body.extend_from_slice(&chunk[..size]);
    }
}

fn write_response(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream
        .write_all(response.as_bytes())
        .expect("Failed to write response");
    stream.flush().ok();
}

/// Answers each incoming connection with the next scripted response.
fn spawn_backend(script: Vec<(&'static str, &'static str)>) -> (u16, Receiver<RecordedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind loopback listener");
    let port = listener.local_addr().expect("Missing local addr").port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for (status, body) in script {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let request = read_request(&mut stream);
            let _ = tx.send(request);
            write_response(&mut stream, status, body);
        }
    });

    (port, rx)
}

fn client(port: u16, tokens: Arc<dyn TokenStore>) -> CommandClient {
    let config = ClientConfig {
        api_base_url: format!("http://127.0.0.1:{port}"),
        request_timeout_secs: 5,
        ..ClientConfig::default()
    };
    CommandClient::new(&config, tokens).expect("Failed to build command client")
}

fn next(rx: &Receiver<RecordedRequest>) -> RecordedRequest {
    rx.recv_timeout(Duration::from_secs(5))
        .expect("Backend saw no request")
}

#[test]
fn login_then_authenticated_call_over_http() {
    let (port, requests) = spawn_backend(vec![("200 OK", AUTH_BODY), ("200 OK", HEALTH_BODY)]);
    let store = Arc::new(MemoryTokenStore::new());
    let client = client(port, store.clone());

    let auth = client.login("pilot", "secret").expect("login");
    assert_eq!(auth.user.username, "pilot");
    assert_eq!(store.load().as_deref(), Some("tok-123"));

    let login = next(&requests);
    assert_eq!(login.method, "POST");
    assert_eq!(login.target, "/login");
    assert_eq!(login.authorization, None);
    let body: serde_json::Value = serde_json::from_str(&login.body).expect("login body is JSON");
    assert_eq!(body["username"], "pilot");
    assert_eq!(body["password"], "secret");

    let health = client.get_health().expect("health");
    assert_eq!(health.status, HealthStatus::Healthy);
    let request = next(&requests);
    assert_eq!(request.target, "/health");
    assert_eq!(request.authorization.as_deref(), Some("Bearer tok-123"));
}

#[test]
fn backend_error_body_is_surfaced() {
    let (port, _requests) = spawn_backend(vec![(
        "409 Conflict",
        r#"{"detail":"Mission already running","code":"MISSION_ACTIVE","timestamp":"2026-01-30T12:00:00Z"}"#,
    )]);
    let client = client(port, Arc::new(MemoryTokenStore::with_token("tok")));

    match client.start_mission() {
        Err(ClientError::Request { status, error }) => {
            assert_eq!(status, 409);
            assert_eq!(error.code, "MISSION_ACTIVE");
            assert_eq!(error.detail, "Mission already running");
        }
        other => panic!("expected request error, got {other:?}"),
    }
}

#[test]
fn unreachable_backend_is_network_error() {
    let port = TcpListener::bind("127.0.0.1:0")
        .expect("bind")
        .local_addr()
        .expect("addr")
        .port();
    let client = client(port, Arc::new(MemoryTokenStore::new()));

    let err = client.get_mission_status().unwrap_err();
    assert!(matches!(err, ClientError::Network { .. }));
    assert_eq!(
        err.error_response().map(|error| error.code.as_str()),
        Some("NETWORK_ERROR")
    );
}

#[test]
fn upload_streams_multipart_with_bearer_and_progress() {
    let (port, requests) = spawn_backend(vec![("200 OK", r#"{"upload_id":"up-7"}"#)]);
    let temp = tempfile::TempDir::new().expect("temp dir");
    let path = temp.path().join("survey.log");
    std::fs::write(&path, "altitude=120\n".repeat(32)).expect("write upload fixture");

    let client = client(port, Arc::new(MemoryTokenStore::with_token("tok-9")));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let upload_id = client
        .upload_file(
            &path,
            Some(Box::new(move |percent: f64| seen_clone.lock().unwrap().push(percent))),
        )
        .expect("upload");
    assert_eq!(upload_id, "up-7");

    let request = next(&requests);
    assert_eq!(request.method, "POST");
    assert_eq!(request.target, "/upload");
    assert_eq!(request.authorization.as_deref(), Some("Bearer tok-9"));
    assert!(request
        .content_type
        .as_deref()
        .is_some_and(|value| value.starts_with("multipart/form-data")));
    assert!(request.body.contains(r#"name="file""#));
    assert!(request.body.contains(r#"filename="survey.log""#));
    assert!(request.body.contains("altitude=120"));

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert_eq!(seen.last().copied(), Some(100.0));
}
