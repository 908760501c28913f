//! Request audit middleware.
//!
//! # Responsibilities
//! - Decide per request whether to log it (exclusions, sampling)
//! - Merge request facts (method, path, client IP, user agent, route) into
//!   the context store
//! - Emit `request_start` and `request_end` with redacted payloads
//! - Record status and duration for every request, logged or not
//!
//! # Design Decisions
//! - Sampling rate and body limit are read on each request
//! - Capture problems degrade to placeholders; the request always proceeds

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::{Map, Value};

use crate::config::LiveSettings;
use crate::http::request::{
    capture_request_payload, client_ip, user_agent, RequestIdExt, X_REQUEST_ID,
};
use crate::http::response::{capture_response_body, loggable_headers, set_default_header};
use crate::observability::context;
use crate::observability::logging::Structured;
use crate::observability::timing::round_ms;

/// Sampling decision. `draw` is a uniform value in [0, 1).
pub fn should_log_request(excluded: bool, sample_rate: f64, draw: f64) -> bool {
    if excluded {
        return false;
    }
    if sample_rate >= 1.0 {
        return true;
    }
    if sample_rate <= 0.0 {
        return false;
    }
    draw <= sample_rate
}

pub async fn request_audit_middleware(
    State(settings): State<LiveSettings>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let request_id = request.request_id().map(str::to_string);
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client_ip = client_ip(request.headers(), peer);
    let user_agent = user_agent(request.headers());
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string());

    let should_log = should_log_request(
        settings.is_excluded(&path),
        settings.sample_rate(),
        rand::random::<f64>(),
    );

    let mut facts = Map::new();
    facts.insert("method".into(), Value::String(method.clone()));
    facts.insert("path".into(), Value::String(path.clone()));
    facts.insert("client_ip".into(), Value::String(client_ip.clone()));
    facts.insert("user_agent".into(), user_agent.clone().into());
    facts.insert("route".into(), route.clone().into());
    context::merge_context(facts);

    let redactor = should_log.then(|| settings.redactor());
    let request = match &redactor {
        Some(redactor) => {
            let (request, payload) =
                capture_request_payload(request, redactor, settings.max_body_bytes()).await;
            tracing::info!(
                target: "http.request",
                event = "request_start",
                method = %method,
                path = %path,
                client_ip = %client_ip,
                user_agent = user_agent.as_deref(),
                route = route.as_deref(),
                request_payload = ?Structured(&payload),
                "request_start"
            );
            request
        }
        None => request,
    };

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = round_ms(start.elapsed().as_secs_f64() * 1000.0);
    context::merge_field("status", status);
    context::merge_field("duration_ms", duration_ms);

    let mut response = match &redactor {
        Some(redactor) => {
            let (response, body) =
                capture_response_body(response, redactor, settings.response_body_max_bytes())
                    .await;
            tracing::info!(
                target: "http.request",
                event = "request_end",
                status,
                duration_ms,
                route = route.as_deref(),
                response_body = body.as_deref(),
                response_headers = ?Structured(loggable_headers(response.headers())),
                "request_end"
            );
            response
        }
        None => response,
    };

    if let Some(id) = request_id.or_else(context::correlation_id) {
        set_default_header(response.headers_mut(), X_REQUEST_ID, &id);
    }
    response
}
