//! Attendance observability service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ correlation ──▶ body limit ──▶ audit ──▶ timeout ──▶ panic catcher ──▶ handler
//!                         │                            │                                        │
//!                         ▼                            ▼                                        ▼
//!                  context store  ◀──────────── request facts ◀──────────────────────── db timing
//!                         │
//!                         ▼
//!                 JSON log layer ──▶ stdout
//!                 alert layer    ──▶ webhook worker
//!
//!     Startup: config → logging → database probe (retry) → serve
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use attendance_observability::config::loader::load_config;
use attendance_observability::config::watcher::ConfigWatcher;
use attendance_observability::config::{EnvSource, ServiceConfig};
use attendance_observability::health::Database;
use attendance_observability::lifecycle::{initialize_database, Shutdown};
use attendance_observability::observability::init_logging;
use attendance_observability::resilience::RetryPolicy;
use attendance_observability::HttpServer;

#[derive(Parser)]
#[command(name = "attendance-observability")]
#[command(about = "Structured logging, correlation and audit for the attendance service", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the configuration file when it changes.
    #[arg(short, long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };
    let env = Arc::new(EnvSource);
    config.apply_env(env.as_ref());

    let alert_sink = init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        alerts = alert_sink.is_some(),
        "attendance-observability starting"
    );

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();
    let server_shutdown = shutdown.subscribe();

    let database = Arc::new(Database::from_config(&config.database));
    initialize_database(
        &database,
        &RetryPolicy::from(&config.startup),
        shutdown.subscribe(),
    )
    .await;

    // The watcher stops when dropped, so it is held until the server returns.
    let (_watcher, updates) = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), Some(updates))
        }
        _ => (None, None),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, env, database);
    server.run(listener, updates, server_shutdown).await?;

    if let Some(sink) = alert_sink {
        if sink.dropped() > 0 {
            tracing::warn!(dropped = sink.dropped(), "Alerts dropped while the webhook was slow");
        }
        sink.abort();
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
