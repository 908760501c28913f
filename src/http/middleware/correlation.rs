//! Correlation ID middleware.
//!
//! # Responsibilities
//! - Accept a caller-supplied `X-Request-ID` or generate a UUID v4
//! - Bind the ID to a fresh context store for the whole request
//! - Echo the ID on the response
//!
//! # Design Decisions
//! - The store lives exactly as long as the request future, so teardown
//!   needs no explicit cleanup on error, panic or client disconnect
//! - A blank or non-ASCII header counts as absent

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::http::request::{RequestId, X_REQUEST_ID};
use crate::observability::context;

/// Resolve the correlation ID for an incoming header value.
pub fn resolve_request_id(header: Option<&HeaderValue>) -> String {
    header
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub async fn correlation_middleware(mut request: Request, next: Next) -> Response {
    let id = resolve_request_id(request.headers().get(X_REQUEST_ID));

    if let Ok(value) = HeaderValue::from_str(&id) {
        request.headers_mut().insert(X_REQUEST_ID, value);
    }
    request.extensions_mut().insert(RequestId(id.clone()));

    context::scope(async move {
        context::set_correlation_id(id.clone());
        let mut response = next.run(request).await;
        if let Ok(value) = HeaderValue::from_str(&id) {
            response.headers_mut().insert(X_REQUEST_ID, value);
        }
        response
    })
    .await
}
