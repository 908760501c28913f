//! Error alerts forwarded to an external webhook.
//!
//! # Data Flow
//! ```text
//! error! event
//!     → AlertLayer (renders summary, try_send, never waits)
//!     → bounded queue
//!     → single worker task (one POST at a time, short timeout)
//!     → webhook
//! ```
//!
//! Delivery failures are reported as WARN events under the `alert_sink`
//! target, which are never alerted themselves.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use url::Url;

use crate::observability::context;
use crate::observability::logging::EventFields;

/// Error type for alert sink setup.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert sink requires a running Tokio runtime")]
    NoRuntime,
    #[error("invalid webhook URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to build webhook client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Render the human-readable alert text.
pub fn alert_summary(level: &Level, message: &str, request_id: Option<&str>) -> String {
    format!(
        "[{}] {} (request_id={})",
        level,
        message,
        request_id.unwrap_or("none")
    )
}

/// Layer queueing ERROR events for the webhook worker.
pub struct AlertLayer {
    tx: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
}

impl<S: Subscriber> Layer<S> for AlertLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = event.metadata().level();
        if *level != Level::ERROR {
            return;
        }
        let fields = EventFields::from_event(event);
        let summary = alert_summary(
            level,
            fields.message.as_deref().unwrap_or_default(),
            context::correlation_id().as_deref(),
        );
        if self.tx.try_send(summary).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Handle on the running webhook worker.
pub struct AlertSink {
    worker: JoinHandle<()>,
    dropped: Arc<AtomicU64>,
}

impl AlertSink {
    /// Alerts discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop the worker. Queued alerts are discarded.
    pub fn abort(&self) {
        self.worker.abort();
    }
}

/// Spawn the webhook worker on the current runtime.
pub fn spawn_alert_sink(
    webhook_url: &str,
    timeout: Duration,
    capacity: usize,
) -> Result<(AlertLayer, AlertSink), AlertError> {
    let url = Url::parse(webhook_url)?;
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| AlertError::NoRuntime)?;
    let client = reqwest::Client::builder().timeout(timeout).build()?;

    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let worker = runtime.spawn(deliver_alerts(client, url, rx));

    Ok((
        AlertLayer {
            tx,
            dropped: dropped.clone(),
        },
        AlertSink { worker, dropped },
    ))
}

async fn deliver_alerts(client: reqwest::Client, url: Url, mut rx: mpsc::Receiver<String>) {
    while let Some(text) = rx.recv().await {
        let result = client
            .post(url.clone())
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .and_then(|response| response.error_for_status());

        // The webhook URL is a credential; keep it out of the diagnostic
        if let Err(e) = result {
            tracing::warn!(target: "alert_sink", error = %e.without_url(), "Alert delivery failed");
        }
    }
}
