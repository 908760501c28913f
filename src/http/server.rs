//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the operational endpoints
//! - Wire up the observability pipeline around every route
//! - Apply configuration reloads to the live settings
//! - Serve until shutdown, draining in-flight requests

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::config::{ConfigSource, LiveSettings, ServiceConfig};
use crate::health::Database;
use crate::http::error::problem_response;
use crate::http::handlers;
use crate::http::middleware::{correlation_middleware, request_audit_middleware};
use crate::security::ClientLogLimiter;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub settings: LiveSettings,
    pub database: Arc<Database>,
    pub client_logs: Arc<ClientLogLimiter>,
}

/// HTTP server hosting the observability pipeline.
pub struct HttpServer {
    router: Router,
    settings: LiveSettings,
}

impl HttpServer {
    pub fn new(config: ServiceConfig, env: Arc<dyn ConfigSource>, database: Arc<Database>) -> Self {
        Self::with_routes(config, env, database, Router::new())
    }

    /// Like [`HttpServer::new`], with application routes served behind the
    /// same pipeline as the operational endpoints.
    pub fn with_routes(
        config: ServiceConfig,
        env: Arc<dyn ConfigSource>,
        database: Arc<Database>,
        routes: Router<AppState>,
    ) -> Self {
        let settings = LiveSettings::new(config, env);
        let state = AppState {
            settings: settings.clone(),
            database,
            client_logs: Arc::new(ClientLogLimiter::new()),
        };
        let router = Self::build_router(state, routes);
        Self { router, settings }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: AppState, routes: Router<AppState>) -> Router {
        let config = state.settings.current();
        let settings = state.settings.clone();

        // Layers wrap outward: the last one added runs first.
        Router::new()
            .route("/health", get(handlers::health))
            .route("/ready", get(handlers::ready))
            .route("/client-logs", post(handlers::client_logs))
            .merge(routes)
            .fallback(handlers::not_found)
            .with_state(state)
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::from_fn_with_state(
                settings,
                request_audit_middleware,
            ))
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes))
            .layer(middleware::from_fn(correlation_middleware))
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn settings(&self) -> &LiveSettings {
        &self.settings
    }

    /// Serve on `listener` until `shutdown` fires.
    ///
    /// Configurations received on `config_updates` replace the
    /// `[observability]` and `[client_logs]` sections of the live settings.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: Option<mpsc::UnboundedReceiver<ServiceConfig>>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if let Some(updates) = config_updates {
            tokio::spawn(apply_config_updates(self.settings.clone(), updates));
        }

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn apply_config_updates(
    settings: LiveSettings,
    mut updates: mpsc::UnboundedReceiver<ServiceConfig>,
) {
    while let Some(update) = updates.recv().await {
        settings.apply(merge_update(&settings.current(), update));
        tracing::info!(
            sample_rate = settings.sample_rate(),
            response_body_max_bytes = settings.response_body_max_bytes(),
            "Live settings updated"
        );
    }
}

/// Live sections of `update` over `current`. `sensitive_fields` is kept from
/// `current` because the log layer's redaction policy is fixed at startup.
fn merge_update(current: &ServiceConfig, update: ServiceConfig) -> ServiceConfig {
    let mut next = current.clone();
    let sensitive_fields = std::mem::take(&mut next.observability.sensitive_fields);
    next.observability = update.observability;
    next.observability.sensitive_fields = sensitive_fields;
    next.client_logs = update.client_logs;
    next
}

fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    tracing::error!(error_type = "Panic", error = %detail, "Handler panicked");
    problem_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal server error".to_string(),
    )
}
