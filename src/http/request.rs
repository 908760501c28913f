//! Request inspection.
//!
//! # Responsibilities
//! - Carry the correlation ID as a request extension
//! - Derive client IP, user agent and query parameters for the audit log
//! - Buffer and redact JSON request bodies without consuming them
//!
//! # Design Decisions
//! - Payload capture never fails the request; problems become a
//!   `body_error` placeholder
//! - Bodies are only buffered for methods that carry one and only when JSON

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request};
use serde_json::{Map, Value};

use crate::observability::redact::Redactor;

/// Correlation header, on both request and response.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Placeholder recorded when the request body cannot be captured.
pub const BODY_UNAVAILABLE: &str = "unavailable";

/// Correlation ID bound to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Access to the request's correlation ID.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&str> {
        self.extensions().get::<RequestId>().map(RequestId::as_str)
    }
}

/// First `X-Forwarded-For` entry, else the peer address, else `"unknown"`.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

pub fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Query string as key → list of values, in order of appearance.
pub fn query_params(query: Option<&str>) -> Map<String, Value> {
    let mut params = Map::new();
    let Some(query) = query else {
        return params;
    };
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        let entry = params
            .entry(key.into_owned())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(values) = entry {
            values.push(Value::String(value.into_owned()));
        }
    }
    params
}

fn carries_body(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

pub(crate) fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

/// Capture the redacted `request_payload` for the audit log.
///
/// The body is buffered up to `max_body_bytes` and handed back to the caller
/// inside a rebuilt request. A body that cannot be read is replaced by an
/// empty one and reported as `body_error`.
pub async fn capture_request_payload(
    request: Request<Body>,
    redactor: &Redactor,
    max_body_bytes: usize,
) -> (Request<Body>, Map<String, Value>) {
    let mut payload = Map::new();

    let query = query_params(request.uri().query());
    if !query.is_empty() {
        payload.insert("query".into(), redactor.redact(&Value::Object(query)));
    }

    if !carries_body(request.method()) || !is_json(request.headers()) {
        return (request, payload);
    }

    if declared_length(request.headers()).is_some_and(|len| len > max_body_bytes) {
        payload.insert("body_error".into(), Value::String(BODY_UNAVAILABLE.into()));
        return (request, payload);
    }

    let (parts, body) = request.into_parts();
    match axum::body::to_bytes(body, max_body_bytes).await {
        Ok(bytes) => {
            if let Ok(json) = serde_json::from_slice::<Value>(&bytes) {
                payload.insert("json".into(), redactor.redact(&json));
            }
            (Request::from_parts(parts, Body::from(bytes)), payload)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Request body capture failed");
            payload.insert("body_error".into(), Value::String(BODY_UNAVAILABLE.into()));
            (Request::from_parts(parts, Body::empty()), payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    fn json_request(method: Method, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_client_ip_precedence() {
        let peer: SocketAddr = "192.168.1.9:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, None), "unknown");
        assert_eq!(client_ip(&headers, Some(peer)), "192.168.1.9");

        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"));
        assert_eq!(client_ip(&headers, Some(peer)), "203.0.113.7");
    }

    #[test]
    fn test_query_params_keep_repeats() {
        let params = query_params(Some("class_id=3&date=2024-05-01&class_id=4"));
        assert_eq!(Value::Object(params), json!({"class_id": ["3", "4"], "date": ["2024-05-01"]}));
        assert!(query_params(None).is_empty());
    }

    #[test]
    fn test_is_json() {
        let mut headers = HeaderMap::new();
        assert!(!is_json(&headers));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        assert!(is_json(&headers));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/problem+json"));
        assert!(is_json(&headers));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!is_json(&headers));
    }

    #[tokio::test]
    async fn test_capture_redacts_and_preserves_body() {
        let body = r#"{"student":{"name":"Ana","email":"ana@school.test"},"status":"present"}"#;
        let request = json_request(Method::POST, "/api/attendance?token=abc&day=mon", body);

        let (request, payload) = capture_request_payload(request, &Redactor::default(), 1024).await;

        assert_eq!(payload["query"], json!({"token": "[REDACTED]", "day": ["mon"]}));
        assert_eq!(payload["json"]["student"]["email"], "[REDACTED]");
        assert_eq!(payload["json"]["student"]["name"], "Ana");
        let forwarded = axum::body::to_bytes(request.into_body(), 1024).await.unwrap();
        assert_eq!(forwarded, body.as_bytes());
    }

    #[tokio::test]
    async fn test_capture_skips_get_bodies() {
        let request = json_request(Method::GET, "/api/classes", r#"{"password":"x"}"#);
        let (_, payload) = capture_request_payload(request, &Redactor::default(), 1024).await;
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_body_is_placeholder() {
        let body = "x".repeat(64);
        let request = Request::builder()
            .method(Method::PUT)
            .uri("/api/attendance")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body.clone()))
            .unwrap();

        let (request, payload) = capture_request_payload(request, &Redactor::default(), 16).await;

        assert_eq!(payload["body_error"], "unavailable");
        let forwarded = axum::body::to_bytes(request.into_body(), 1024).await.unwrap();
        assert_eq!(forwarded.len(), 64);
    }

    #[tokio::test]
    async fn test_invalid_json_is_omitted() {
        let request = json_request(Method::POST, "/client-logs", "{not json");
        let (_, payload) = capture_request_payload(request, &Redactor::default(), 1024).await;
        assert!(!payload.contains_key("json"));
        assert!(!payload.contains_key("body_error"));
    }

    #[test]
    fn test_request_id_extension() {
        let mut request = Request::new(Body::empty());
        assert_eq!(request.request_id(), None);
        request.extensions_mut().insert(RequestId("abc".into()));
        assert_eq!(request.request_id(), Some("abc"));
    }
}
