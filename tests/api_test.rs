//! Operational endpoints and problem-details errors.

use std::sync::Arc;

use attendance_observability::config::source::keys;
use attendance_observability::config::{MapSource, ServiceConfig};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio::net::TcpListener;

mod common;

use common::{body_json, database_config, get_request, json_request, send, test_server, test_server_with, LogCapture};

fn router(env: Arc<MapSource>) -> Router {
    test_server(env).router()
}

fn router_with_database(url: &str) -> Router {
    let mut config = ServiceConfig::default();
    config.database = database_config(url);
    test_server_with(config, Arc::new(MapSource::new()), Router::new()).router()
}

#[tokio::test]
async fn test_health() {
    let response = send(&router(Arc::new(MapSource::new())), get_request("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_ready_without_database() {
    let response = send(&router(Arc::new(MapSource::new())), get_request("/ready")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "ready"}));
}

#[tokio::test]
async fn test_ready_reprobes_reachable_database() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let router = router_with_database(&format!("postgres://127.0.0.1:{port}/attendance"));

    let response = send(&router, get_request("/ready")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_ready_reports_unreachable_database() {
    let (logs, _guard) = LogCapture::install();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let router = router_with_database(&format!("postgresql://127.0.0.1:{port}/attendance"));

    let request = Request::builder()
        .uri("/ready")
        .header("x-request-id", "ready-1")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/problem+json");
    let body = body_json(response).await;
    assert_eq!(body["title"], "Service Unavailable");
    assert_eq!(body["request_id"], "ready-1");
    assert!(body["detail"].as_str().unwrap().starts_with("database not ready"));

    let failure = &logs.events("Request failed")[0];
    assert_eq!(failure["level"], "ERROR");
    assert_eq!(failure["error_type"], "Unavailable");
    assert_eq!(failure["status"], 503);
    assert_eq!(failure["request_id"], "ready-1");
    assert!(failure["db_time_ms"].as_f64().is_some());
}

#[tokio::test]
async fn test_unsupported_database_url_serves_degraded() {
    let (logs, _guard) = LogCapture::install();
    let router = router_with_database("mongodb://db.internal/attendance");

    let health = send(&router, get_request("/health")).await;
    assert_eq!(health.status(), StatusCode::OK);

    let ready = send(&router, get_request("/ready")).await;
    assert_eq!(ready.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(ready).await;
    assert!(body["detail"].as_str().unwrap().contains("mongodb"), "{body}");

    let startup = &logs.events("Database URL cannot be probed; readiness stays down")[0];
    assert_eq!(startup["level"], "ERROR");
    assert_eq!(startup["error_type"], "UnsupportedScheme");
}

#[tokio::test]
async fn test_client_log_is_accepted_and_logged() {
    let (logs, _guard) = LogCapture::install();
    let router = router(Arc::new(MapSource::new()));

    let response = send(
        &router,
        json_request(
            "POST",
            "/client-logs",
            json!({
                "level": "warning",
                "message": "Attendance grid failed to render",
                "context": {"page": "/classes/3", "token": "secret-token"}
            }),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await, json!({"status": "accepted"}));

    let line = &logs.events("Attendance grid failed to render")[0];
    assert_eq!(line["logger"], "client");
    assert_eq!(line["level"], "WARN");
    assert_eq!(line["extra_context"]["client_level"], "warning");
    assert_eq!(line["extra_context"]["client_context"]["page"], "/classes/3");
    assert_eq!(line["extra_context"]["client_context"]["token"], "[REDACTED]");
    assert!(!logs.raw().contains("secret-token"));
}

#[tokio::test]
async fn test_client_log_rejects_invalid_payload() {
    let router = router(Arc::new(MapSource::new()));

    let missing_field = send(&router, json_request("POST", "/client-logs", json!({"level": "info"}))).await;
    assert_eq!(missing_field.status(), StatusCode::BAD_REQUEST);
    let body = body_json(missing_field).await;
    assert_eq!(body["status"], 400);
    assert!(body["request_id"].is_string());

    let blank = send(
        &router,
        json_request("POST", "/client-logs", json!({"level": "info", "message": "  "})),
    )
    .await;
    assert_eq!(blank.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_client_log_rate_limit() {
    let env = Arc::new(MapSource::with([(keys::CLIENT_LOG_RATE_LIMIT, "2")]));
    let router = router(env);
    let entry = json!({"level": "info", "message": "tick"});

    for _ in 0..2 {
        let response = send(&router, json_request("POST", "/client-logs", entry.clone())).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
    let limited = send(&router, json_request("POST", "/client-logs", entry.clone())).await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().contains_key(header::RETRY_AFTER));
    let body: Value = body_json(limited).await;
    assert_eq!(body["title"], "Too Many Requests");

    // A different client has its own window
    let other = Request::builder()
        .method("POST")
        .uri("/client-logs")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "198.51.100.20")
        .body(Body::from(entry.to_string()))
        .unwrap();
    assert_eq!(send(&router, other).await.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_unknown_path_is_problem_details() {
    let request = Request::builder()
        .uri("/api/nope")
        .header("x-request-id", "nf-1")
        .body(Body::empty())
        .unwrap();
    let response = send(&router(Arc::new(MapSource::new())), request).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-request-id"], "nf-1");
    let body = body_json(response).await;
    assert_eq!(
        body,
        json!({
            "type": "about:blank",
            "title": "Not Found",
            "status": 404,
            "detail": "no resource at /api/nope",
            "request_id": "nf-1"
        })
    );
}
