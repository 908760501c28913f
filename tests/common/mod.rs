//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use attendance_observability::config::{DatabaseConfig, MapSource, ServiceConfig};
use attendance_observability::health::Database;
use attendance_observability::http::AppState;
use attendance_observability::observability::{JsonLogLayer, Redactor};
use attendance_observability::HttpServer;
use attendance_observability::observability::{context, DbTimer};
use axum::body::Body;
use axum::extract::Path;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceExt;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

/// In-memory log sink.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

pub struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter(Arc::clone(&self.0))
    }
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "lock poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    /// Install as the thread's subscriber until the guard drops.
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::registry()
            .with(JsonLogLayer::new(capture.clone(), Redactor::default()));
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn lines(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    /// Lines whose `msg` equals `msg`.
    pub fn events(&self, msg: &str) -> Vec<Value> {
        self.lines()
            .into_iter()
            .filter(|line| line["msg"] == msg)
            .collect()
    }

    pub fn raw(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

/// Server with default configuration, no database and `env` as the
/// decision-time key source.
pub fn test_server(env: Arc<MapSource>) -> HttpServer {
    test_server_with(ServiceConfig::default(), env, Router::new())
}

pub fn test_server_with(
    config: ServiceConfig,
    env: Arc<MapSource>,
    routes: Router<AppState>,
) -> HttpServer {
    let database = Database::from_config(&config.database);
    HttpServer::with_routes(config, env, Arc::new(database), routes)
}

pub fn database_config(url: &str) -> DatabaseConfig {
    DatabaseConfig {
        url: Some(url.to_string()),
        connect_timeout_ms: 200,
    }
}

/// Send one request through the router.
pub async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Start a mock webhook answering every POST with `status`. Received bodies
/// arrive on the returned channel.
pub async fn start_mock_webhook(status: u16) -> (SocketAddr, mpsc::UnboundedReceiver<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let Some(body) = read_request_body(&mut socket).await else {
                    return;
                };
                if let Ok(json) = serde_json::from_slice(&body) {
                    let _ = tx.send(json);
                }
                let reason = if status < 400 { "OK" } else { "Error" };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, rx)
}

async fn read_request_body(socket: &mut tokio::net::TcpStream) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Some(buf[header_end..].to_vec())
}

/// Application routes standing in for the attendance API.
pub fn app_routes() -> Router<AppState> {
    Router::new()
        .route("/api/classes/{id}/students", get(list_students))
        .route("/api/attendance", post(save_attendance))
        .route("/api/session", get(session))
        .route("/boom", get(boom))
}

async fn list_students(Path(id): Path<u32>) -> Json<Value> {
    {
        let _timer = DbTimer::start();
        tokio::task::yield_now().await;
    }
    context::merge_field("classroom_id", id);
    tokio::task::yield_now().await;
    tracing::info!(target: "app.api", "Listed students");
    Json(json!({
        "classroom_id": id,
        "students": [{"name": "Ana", "email": "ana@school.test"}],
    }))
}

async fn save_attendance(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    tracing::info!(target: "app.api", "Saved attendance");
    (StatusCode::CREATED, Json(body))
}

async fn session() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, "session=secret")],
        Json(json!({"ok": true})),
    )
}

async fn boom() -> &'static str {
    panic!("handler exploded")
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
