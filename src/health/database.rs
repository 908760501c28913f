//! Database reachability probe.
//!
//! The storage engine itself lives outside this crate; readiness only needs
//! to know whether the configured server accepts connections.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time;
use url::Url;

use crate::config::DatabaseConfig;

/// Error type for database probing.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("invalid database URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("database URL has no host")]
    MissingHost,
    #[error("unsupported database scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("database {addr} unreachable")]
    Unreachable {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("database {addr} did not answer within {timeout_ms}ms")]
    Timeout { addr: String, timeout_ms: u64 },
    #[error("database URL cannot be probed: {0}")]
    Unprobeable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// File-backed engine; always reachable.
    Local,
    Server { host: String, port: u16 },
    /// URL the probe cannot use; never ready.
    Unprobeable { reason: String },
}

/// Rewrite the legacy `postgres://` scheme to `postgresql://`.
pub fn normalize_database_url(raw: &str) -> String {
    match raw.strip_prefix("postgres://") {
        Some(rest) => format!("postgresql://{rest}"),
        None => raw.to_string(),
    }
}

/// Default port for a scheme. A driver suffix (`postgresql+psycopg2`) is
/// ignored.
fn default_port(scheme: &str) -> Option<u16> {
    let engine = scheme.split('+').next().unwrap_or(scheme);
    match engine {
        "postgresql" => Some(5432),
        "mysql" | "mariadb" => Some(3306),
        "redis" => Some(6379),
        _ => None,
    }
}

fn parse_target(raw: &str) -> Result<Target, DatabaseError> {
    let url = Url::parse(&normalize_database_url(raw))?;
    let scheme = url.scheme();
    if scheme.starts_with("sqlite") {
        return Ok(Target::Local);
    }
    let host = url.host_str().ok_or(DatabaseError::MissingHost)?;
    let port = url
        .port()
        .or_else(|| default_port(scheme))
        .ok_or_else(|| DatabaseError::UnsupportedScheme(scheme.to_string()))?;
    Ok(Target::Server {
        host: host.to_string(),
        port,
    })
}

/// Configured database plus its last observed readiness.
#[derive(Debug)]
pub struct Database {
    target: Option<Target>,
    connect_timeout: Duration,
    ready: AtomicBool,
}

impl Database {
    /// Build from configuration. A missing URL means no database is used and
    /// the service is always ready. A URL that cannot be probed is logged and
    /// leaves the service permanently not ready.
    pub fn from_config(config: &DatabaseConfig) -> Self {
        let target = config.url.as_deref().map(|raw| {
            parse_target(raw).unwrap_or_else(|err| {
                tracing::error!(
                    error = &err as &(dyn std::error::Error + 'static),
                    "Database URL cannot be probed; readiness stays down"
                );
                Target::Unprobeable {
                    reason: err.to_string(),
                }
            })
        });
        let ready = matches!(target, None | Some(Target::Local));
        Self {
            target,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            ready: AtomicBool::new(ready),
        }
    }

    /// Host and port probed, for logging. Credentials never appear here.
    pub fn address(&self) -> Option<String> {
        match &self.target {
            Some(Target::Server { host, port }) => Some(format!("{host}:{port}")),
            _ => None,
        }
    }

    /// Open and close one connection to the server.
    pub async fn check(&self) -> Result<(), DatabaseError> {
        let (host, port) = match &self.target {
            Some(Target::Server { host, port }) => (host.as_str(), *port),
            Some(Target::Unprobeable { reason }) => {
                return Err(DatabaseError::Unprobeable(reason.clone()))
            }
            None | Some(Target::Local) => return Ok(()),
        };
        let addr = format!("{host}:{port}");
        match time::timeout(self.connect_timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(source)) => Err(DatabaseError::Unreachable { addr, source }),
            Err(_) => Err(DatabaseError::Timeout {
                addr,
                timeout_ms: self.connect_timeout.as_millis() as u64,
            }),
        }
    }

    /// Probe and record the outcome.
    pub async fn refresh(&self) -> Result<(), DatabaseError> {
        let result = self.check().await;
        self.mark_ready(result.is_ok());
        result
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn mark_ready(&self, ready: bool) {
        let was = self.ready.swap(ready, Ordering::Relaxed);
        if was != ready {
            tracing::info!(ready, address = ?self.address(), "Database readiness changed");
        }
    }
}
