//! Response inspection for the audit log.
//!
//! # Responsibilities
//! - Capture a bounded, redacted copy of the response body
//! - List response headers safe to log
//!
//! # Design Decisions
//! - Streamed bodies (no exact size hint) are never buffered
//! - The client always receives the original bytes; only the logged copy
//!   is redacted and truncated

use axum::body::{Body, HttpBody};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use serde_json::{Map, Value};

use crate::http::request::is_json;
use crate::observability::redact::Redactor;

/// Headers never written to the log.
const HIDDEN_HEADERS: &[&str] = &["set-cookie"];

/// Cut `body` to at most `limit` bytes on a character boundary, appending
/// the number of bytes left out.
pub fn truncate_body(body: &str, limit: usize) -> String {
    if body.len() <= limit {
        return body.to_string();
    }
    let mut cut = limit;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... truncated {} bytes", &body[..cut], body.len() - cut)
}

/// Buffer the response body and return it with the text to log.
///
/// Nothing is captured when `limit` is 0 or the body is streamed.
pub async fn capture_response_body(
    response: Response,
    redactor: &Redactor,
    limit: usize,
) -> (Response, Option<String>) {
    if limit == 0 {
        return (response, None);
    }
    let Some(size) = response.body().size_hint().exact() else {
        return (response, None);
    };

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::try_from(size).unwrap_or(usize::MAX)).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, "Response body capture failed");
            return (Response::from_parts(parts, Body::empty()), None);
        }
    };

    let mut text = String::from_utf8_lossy(&bytes).into_owned();
    if !text.is_empty() && is_json(&parts.headers) {
        if let Ok(json) = serde_json::from_str::<Value>(&text) {
            text = redactor.redact(&json).to_string();
        }
    }

    (
        Response::from_parts(parts, Body::from(bytes)),
        Some(truncate_body(&text, limit)),
    )
}

/// Response headers as a JSON object, without cookies.
pub fn loggable_headers(headers: &HeaderMap) -> Map<String, Value> {
    headers
        .iter()
        .filter(|(name, _)| !HIDDEN_HEADERS.contains(&name.as_str()))
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            )
        })
        .collect()
}

/// Set `name` only when the handler did not.
pub(crate) fn set_default_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if headers.contains_key(name) {
        return;
    }
    if let Ok(value) = header::HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}
