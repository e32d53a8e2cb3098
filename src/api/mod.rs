//! C10: HTTP boundary for the session lifecycle interface. A small
//! hand-rolled server in the same vein as the daemon's old event-export
//! listener (raw `TcpListener` + manual request parsing rather than pulling
//! in a full HTTP framework), generalized from a single read-only export
//! endpoint into the POST lifecycle surface the exam UI drives: starting a
//! session, submitting answers, logging environment-sourced alerts, and
//! closing the attempt out with an integrity report.
//!
//! Authorization is a single bearer token generated at startup and written
//! to `token_path`, checked on every route but `/health`. The old capability
//! token's ten-minute rotation schedule was part of the surveillance
//! kernel's break-glass threat model and isn't needed here: an exam session
//! lasts at most a few hours and the token only needs to survive that one
//! attempt.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::supervisor::SessionSupervisor;
use crate::{AlertKind, LogEventError, StartError, SubmitError};

const MAX_REQUEST_BYTES: usize = 16_384;

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub token_path: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8799".to_string(),
            token_path: None,
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    pub token: String,
    pub token_path: Option<PathBuf>,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join().map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    supervisor: Arc<Mutex<SessionSupervisor>>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, supervisor: Arc<Mutex<SessionSupervisor>>) -> Self {
        Self { cfg, supervisor }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        if configured_addr.ip().is_loopback() && !addr.ip().is_loopback() {
            return Err(anyhow!(
                "api configured for loopback address '{}', but bound to non-loopback address '{}'",
                configured_addr,
                addr
            ));
        }
        listener.set_nonblocking(true)?;

        let mut token_bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut token_bytes);
        let token = hex::encode(token_bytes);
        if let Some(path) = &self.cfg.token_path {
            write_token_file(path, &token)?;
        } else {
            log::warn!("api bearer token generated but no token_path configured to persist it");
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let supervisor = self.supervisor.clone();
        let token_for_thread = token.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, supervisor, &token_for_thread, shutdown_thread) {
                log::error!("session api stopped: {}", err);
            }
        });

        Ok(ApiHandle {
            addr,
            token,
            token_path: self.cfg.token_path,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    supervisor: Arc<Mutex<SessionSupervisor>>,
    token: &str,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &supervisor, token) {
                    log::warn!("session api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[derive(Deserialize)]
struct StartRequestBody {
    exam_id: String,
}

#[derive(Deserialize)]
struct SubmitAnswerRequestBody {
    question_id: String,
    answer: String,
}

#[derive(Deserialize)]
struct LogEventRequestBody {
    kind: AlertKind,
    #[serde(default)]
    details: BTreeMap<String, String>,
    #[serde(default)]
    idempotency_token: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn handle_connection(mut stream: TcpStream, supervisor: &Arc<Mutex<SessionSupervisor>>, token: &str) -> Result<()> {
    let request = read_request(&mut stream)?;

    if request.path == "/health" && request.method == "GET" {
        write_json_response(&mut stream, 200, r#"{"status":"ok"}"#)?;
        return Ok(());
    }

    let presented = match request.bearer_token() {
        Some(t) => t,
        None => return write_error(&mut stream, 401, "missing_token"),
    };
    if presented != token {
        return write_error(&mut stream, 401, "invalid_token");
    }

    let segments: Vec<&str> = request.path.trim_matches('/').split('/').collect();

    match (request.method.as_str(), segments.as_slice()) {
        ("POST", ["sessions", session_id, "start"]) => {
            let body: StartRequestBody = match parse_body(&request) {
                Ok(b) => b,
                Err(_) => return write_error(&mut stream, 400, "invalid_body"),
            };
            let mut sup = supervisor.lock().map_err(|_| anyhow!("supervisor lock poisoned"))?;
            match sup.start(session_id, &body.exam_id) {
                Ok(state) => write_json_value(&mut stream, 200, &state),
                Err(e) => write_error(&mut stream, status_for_start_error(&e), &e.to_string()),
            }
        }
        ("POST", ["sessions", session_id, "submit_answer"]) => {
            let body: SubmitAnswerRequestBody = match parse_body(&request) {
                Ok(b) => b,
                Err(_) => return write_error(&mut stream, 400, "invalid_body"),
            };
            let mut sup = supervisor.lock().map_err(|_| anyhow!("supervisor lock poisoned"))?;
            match sup.submit_answer(session_id, &body.question_id, &body.answer) {
                Ok(()) => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
                Err(e) => write_error(&mut stream, status_for_submit_error(&e), &e.to_string()),
            }
        }
        ("POST", ["sessions", session_id, "submit"]) => {
            let mut sup = supervisor.lock().map_err(|_| anyhow!("supervisor lock poisoned"))?;
            match sup.submit(session_id) {
                Ok(report) => write_json_value(&mut stream, 200, &report),
                Err(e) => write_error(&mut stream, status_for_submit_error(&e), &e.to_string()),
            }
        }
        ("POST", ["sessions", session_id, "events"]) => {
            let body: LogEventRequestBody = match parse_body(&request) {
                Ok(b) => b,
                Err(_) => return write_error(&mut stream, 400, "invalid_body"),
            };
            let mut sup = supervisor.lock().map_err(|_| anyhow!("supervisor lock poisoned"))?;
            match sup.log_event(session_id, body.kind, body.details, body.idempotency_token) {
                Ok(Some(event)) => write_json_value(&mut stream, 200, &event),
                Ok(None) => write_json_response(&mut stream, 200, r#"{"status":"suppressed"}"#),
                Err(e) => write_error(&mut stream, status_for_log_event_error(&e), &e.to_string()),
            }
        }
        ("GET", ["sessions", session_id, "state"]) => {
            let sup = supervisor.lock().map_err(|_| anyhow!("supervisor lock poisoned"))?;
            match sup.state(session_id) {
                Some(state) => write_json_value(&mut stream, 200, &state),
                None => write_error(&mut stream, 404, "unknown_session"),
            }
        }
        _ => write_error(&mut stream, 404, "not_found"),
    }
}

fn status_for_start_error(e: &StartError) -> u16 {
    match e {
        StartError::MaxAttemptsReached => 409,
        StartError::ExamNotAvailable => 409,
        StartError::NotEnrolled => 403,
        StartError::CameraUnavailable => 503,
        StartError::FaceVerificationFailed => 422,
        StartError::VerifierUnavailable => 503,
        StartError::InternalInconsistency(_) => 500,
    }
}

fn status_for_submit_error(e: &SubmitError) -> u16 {
    match e {
        SubmitError::SessionClosed => 409,
        SubmitError::SubmitIncomplete(_) => 422,
        SubmitError::InternalInconsistency(_) => 500,
    }
}

fn status_for_log_event_error(e: &LogEventError) -> u16 {
    match e {
        LogEventError::UnknownKind => 400,
        LogEventError::SessionClosed => 409,
    }
}

fn parse_body<T: for<'de> Deserialize<'de>>(request: &HttpRequest) -> Result<T> {
    serde_json::from_slice(&request.body).map_err(|e| anyhow!("invalid request body: {}", e))
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break data.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4);
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break Some(pos + 4);
        }
    };
    let header_end = header_end.ok_or_else(|| anyhow!("malformed request: no header terminator"))?;

    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?.to_string();
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?.to_string();

    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let content_length: usize = headers.get("content-length").and_then(|v| v.parse().ok()).unwrap_or(0);
    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        if body.len() + data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    let path = raw_path.split('?').next().unwrap_or(&raw_path).to_string();
    Ok(HttpRequest {
        method,
        path,
        headers,
        raw_path,
        body,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_json_value<T: Serialize>(stream: &mut TcpStream, status: u16, value: &T) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    write_response(stream, status, "application/json", &payload)
}

fn write_error(stream: &mut TcpStream, status: u16, message: &str) -> Result<()> {
    let body = serde_json::to_vec(&ErrorBody { error: message.to_string() })?;
    write_response(stream, status, "application/json", &body)
}

fn write_response(stream: &mut TcpStream, status: u16, content_type: &str, body: &[u8]) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        401 => "HTTP/1.1 401 Unauthorized",
        403 => "HTTP/1.1 403 Forbidden",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        409 => "HTTP/1.1 409 Conflict",
        422 => "HTTP/1.1 422 Unprocessable Entity",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    raw_path: String,
    body: Vec<u8>,
}

impl HttpRequest {
    fn bearer_token(&self) -> Option<String> {
        if let Some(value) = self.headers.get("authorization") {
            let parts: Vec<&str> = value.split_whitespace().collect();
            if parts.len() == 2 && parts[0].eq_ignore_ascii_case("bearer") {
                return Some(parts[1].to_string());
            }
        }
        None
    }
}

fn write_token_file(path: &Path, token: &str) -> Result<()> {
    std::fs::write(path, format!("{token}\n"))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}
