//! Operational endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::http::error::ApiError;
use crate::http::request::client_ip;
use crate::http::server::AppState;
use crate::observability::context;
use crate::observability::logging::Structured;
use crate::observability::timing::DbTimer;
use crate::security::RateDecision;

/// Logger name for browser-side events.
const CLIENT_LOGGER: &str = "client";

#[derive(Debug, Serialize)]
pub struct Status {
    pub status: &'static str,
}

/// Liveness. Never touches the database.
pub async fn health() -> Json<Status> {
    Json(Status { status: "ok" })
}

/// Readiness. Re-probes once when the last probe failed.
pub async fn ready(State(state): State<AppState>) -> Result<Json<Status>, ApiError> {
    if state.database.is_ready() {
        return Ok(Json(Status { status: "ready" }));
    }

    let result = {
        let _timer = DbTimer::start();
        state.database.refresh().await
    };
    match result {
        Ok(()) => Ok(Json(Status { status: "ready" })),
        Err(err) => Err(ApiError::Unavailable(format!("database not ready: {err}"))),
    }
}

/// Browser log event.
#[derive(Debug, Deserialize)]
pub struct ClientLogEntry {
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

/// Accept a browser log event and route it through the structured logger.
pub async fn client_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ClientLogEntry>, JsonRejection>,
) -> Result<(StatusCode, Json<Status>), ApiError> {
    let ip = context::get_context()
        .get("client_ip")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| client_ip(&headers, None));

    let (limit, window) = state.settings.client_log_limit();
    if let RateDecision::Limited { retry_after } = state.client_logs.check(&ip, limit, window) {
        return Err(ApiError::RateLimited { retry_after });
    }

    let Json(entry) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    if entry.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".into()));
    }

    emit_client_log(&entry);
    Ok((StatusCode::ACCEPTED, Json(Status { status: "accepted" })))
}

fn emit_client_log(entry: &ClientLogEntry) {
    let client_context = entry
        .context
        .as_ref()
        .map(|ctx| tracing::field::debug(Structured(ctx)));
    let level = entry.level.trim().to_ascii_lowercase();
    let message = entry.message.as_str();
    match level.as_str() {
        "error" | "critical" | "fatal" => {
            tracing::error!(target: CLIENT_LOGGER, client_level = %level, client_context, "{message}")
        }
        "warn" | "warning" => {
            tracing::warn!(target: CLIENT_LOGGER, client_level = %level, client_context, "{message}")
        }
        "debug" | "trace" => {
            tracing::debug!(target: CLIENT_LOGGER, client_level = %level, client_context, "{message}")
        }
        _ => {
            tracing::info!(target: CLIENT_LOGGER, client_level = %level, client_context, "{message}")
        }
    }
}

/// Fallback for unknown paths.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}
