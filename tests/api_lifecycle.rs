use anyhow::Result;
use serde_json::Value;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

use proctor_kernel::api::{ApiConfig, ApiHandle, ApiServer};
use proctor_kernel::camera::{CameraConfig, StubCameraSource};
use proctor_kernel::capture::InMemoryObjectStore;
use proctor_kernel::config::SessionConfig;
use proctor_kernel::detect::StubBackend;
use proctor_kernel::face::StubFaceBackend;
use proctor_kernel::guardian::AiGuardian;
use proctor_kernel::ledger::SqliteSessionLedger;
use proctor_kernel::signing_key_from_seed;
use proctor_kernel::supervisor::SessionSupervisor;
use proctor_kernel::verifier::StubEmbeddingBackend;

fn read_response(stream: &mut TcpStream) -> Result<(String, String)> {
    let mut response = String::new();
    stream.read_to_string(&mut response)?;
    let mut parts = response.splitn(2, "\r\n\r\n");
    let headers = parts.next().unwrap_or("").to_string();
    let body = parts.next().unwrap_or("").to_string();
    Ok((headers, body))
}

struct TestApi {
    _dir: tempfile::TempDir,
    api_handle: Option<ApiHandle>,
}

impl TestApi {
    fn new() -> Result<Self> {
        let dir = tempdir()?;
        let db_path = dir.path().join("proctor.db");

        let supervisor = Arc::new(Mutex::new(SessionSupervisor::new(
            Box::new(StubCameraSource::new(CameraConfig { width: 4, height: 4 })),
            Box::new(StubFaceBackend::new()),
            Box::new(StubBackend::new()),
            Box::new(StubEmbeddingBackend::new()),
            Box::new(InMemoryObjectStore::new()),
            Box::new(SqliteSessionLedger::open(db_path.to_str().unwrap())?),
            AiGuardian::new(),
            signing_key_from_seed("devkey:api-test")?,
            SessionConfig::default(),
        )));

        let api_config = ApiConfig {
            addr: "127.0.0.1:0".to_string(),
            token_path: None,
        };
        let api_handle = ApiServer::new(api_config, supervisor).spawn()?;

        Ok(Self {
            _dir: dir,
            api_handle: Some(api_handle),
        })
    }

    fn handle(&self) -> &ApiHandle {
        self.api_handle.as_ref().expect("test API handle should be initialized")
    }
}

impl Drop for TestApi {
    fn drop(&mut self) {
        if let Some(handle) = self.api_handle.take() {
            let _ = handle.stop();
        }
    }
}

#[test]
fn health_endpoint_is_public() -> Result<()> {
    let api = TestApi::new()?;

    let mut stream = TcpStream::connect(api.handle().addr)?;
    stream.write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    let (headers, body) = read_response(&mut stream)?;
    assert!(headers.contains("200 OK"));
    assert!(body.contains(r#""status":"ok""#));

    Ok(())
}

#[test]
fn rejects_missing_bearer_token() -> Result<()> {
    let api = TestApi::new()?;

    let mut stream = TcpStream::connect(api.handle().addr)?;
    stream.write_all(b"GET /sessions/sess-1/state HTTP/1.1\r\nHost: localhost\r\n\r\n")?;
    let (headers, _body) = read_response(&mut stream)?;
    assert!(headers.contains("401 Unauthorized"));

    Ok(())
}

#[test]
fn start_then_state_round_trip() -> Result<()> {
    let api = TestApi::new()?;
    let token = api.handle().token.clone();

    let mut stream = TcpStream::connect(api.handle().addr)?;
    let body = r#"{"exam_id":"exam:test"}"#;
    let request = format!(
        "POST /sessions/sess-1/start HTTP/1.1\r\nHost: localhost\r\nAuthorization: Bearer {token}\r\nContent-Length: {len}\r\n\r\n{body}",
        len = body.len()
    );
    stream.write_all(request.as_bytes())?;
    let (headers, body) = read_response(&mut stream)?;
    assert!(headers.contains("200 OK"));
    assert_eq!(body.trim_matches('"'), "Active");

    let mut stream = TcpStream::connect(api.handle().addr)?;
    let request = format!(
        "GET /sessions/sess-1/state HTTP/1.1\r\nHost: localhost\r\nAuthorization: Bearer {token}\r\n\r\n"
    );
    stream.write_all(request.as_bytes())?;
    let (headers, body) = read_response(&mut stream)?;
    assert!(headers.contains("200 OK"));
    assert_eq!(body.trim_matches('"'), "Active");

    Ok(())
}

#[test]
fn log_event_then_submit_reflects_in_report() -> Result<()> {
    let api = TestApi::new()?;
    let token = api.handle().token.clone();

    let start_body = r#"{"exam_id":"exam:test"}"#;
    let mut stream = TcpStream::connect(api.handle().addr)?;
    let request = format!(
        "POST /sessions/sess-1/start HTTP/1.1\r\nHost: localhost\r\nAuthorization: Bearer {token}\r\nContent-Length: {len}\r\n\r\n{start_body}",
        len = start_body.len()
    );
    stream.write_all(request.as_bytes())?;
    let (headers, _body) = read_response(&mut stream)?;
    assert!(headers.contains("200 OK"));

    let event_body = r#"{"kind":"TabSwitch"}"#;
    let mut stream = TcpStream::connect(api.handle().addr)?;
    let request = format!(
        "POST /sessions/sess-1/events HTTP/1.1\r\nHost: localhost\r\nAuthorization: Bearer {token}\r\nContent-Length: {len}\r\n\r\n{event_body}",
        len = event_body.len()
    );
    stream.write_all(request.as_bytes())?;
    let (headers, body) = read_response(&mut stream)?;
    assert!(headers.contains("200 OK"));
    let event: Value = serde_json::from_str(&body)?;
    assert_eq!(event["kind"], "TabSwitch");

    let mut stream = TcpStream::connect(api.handle().addr)?;
    let request = format!(
        "POST /sessions/sess-1/submit HTTP/1.1\r\nHost: localhost\r\nAuthorization: Bearer {token}\r\nContent-Length: 0\r\n\r\n"
    );
    stream.write_all(request.as_bytes())?;
    let (headers, body) = read_response(&mut stream)?;
    assert!(headers.contains("200 OK"));
    let report: Value = serde_json::from_str(&body)?;
    assert_eq!(report["session_id"], "sess-1");
    assert!(report["score"].as_i64().unwrap() < 100);

    Ok(())
}

#[test]
fn events_on_unknown_kind_returns_bad_request() -> Result<()> {
    let api = TestApi::new()?;
    let token = api.handle().token.clone();

    let start_body = r#"{"exam_id":"exam:test"}"#;
    let mut stream = TcpStream::connect(api.handle().addr)?;
    let request = format!(
        "POST /sessions/sess-1/start HTTP/1.1\r\nHost: localhost\r\nAuthorization: Bearer {token}\r\nContent-Length: {len}\r\n\r\n{start_body}",
        len = start_body.len()
    );
    stream.write_all(request.as_bytes())?;
    let (headers, _body) = read_response(&mut stream)?;
    assert!(headers.contains("200 OK"));

    let event_body = r#"{"kind":"LedgerOverflow"}"#;
    let mut stream = TcpStream::connect(api.handle().addr)?;
    let request = format!(
        "POST /sessions/sess-1/events HTTP/1.1\r\nHost: localhost\r\nAuthorization: Bearer {token}\r\nContent-Length: {len}\r\n\r\n{event_body}",
        len = event_body.len()
    );
    stream.write_all(request.as_bytes())?;
    let (headers, _body) = read_response(&mut stream)?;
    assert!(headers.contains("400 Bad Request"));

    Ok(())
}

#[test]
fn submit_on_unknown_session_returns_conflict() -> Result<()> {
    let api = TestApi::new()?;
    let token = api.handle().token.clone();

    let mut stream = TcpStream::connect(api.handle().addr)?;
    let request = format!(
        "POST /sessions/ghost/submit HTTP/1.1\r\nHost: localhost\r\nAuthorization: Bearer {token}\r\nContent-Length: 0\r\n\r\n"
    );
    stream.write_all(request.as_bytes())?;
    let (headers, _body) = read_response(&mut stream)?;
    assert!(headers.contains("409 Conflict"));

    Ok(())
}
