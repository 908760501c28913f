//! Startup orchestration.
//!
//! # Responsibilities
//! - Probe the database under the startup retry policy
//! - Record readiness so `/ready` reflects the outcome
//!
//! # Design Decisions
//! - Exhausted retries are logged at ERROR and startup continues degraded
//! - Shutdown during the retry wait ends the step early

use std::error::Error as StdError;

use tokio::sync::broadcast;

use crate::health::Database;
use crate::resilience::{run_with_retry_until_shutdown, RetryPolicy};

/// Bring up the database. Returns whether it is reachable.
pub async fn initialize_database(
    database: &Database,
    policy: &RetryPolicy,
    shutdown: broadcast::Receiver<()>,
) -> bool {
    let Some(address) = database.address() else {
        tracing::info!("No database server configured, skipping startup probe");
        return true;
    };

    tracing::info!(
        address = %address,
        max_attempts = policy.max_attempts,
        "Initialising database"
    );

    match run_with_retry_until_shutdown(policy, || database.check(), shutdown).await {
        Ok(()) => {
            database.mark_ready(true);
            tracing::info!(address = %address, "Database reachable");
            true
        }
        Err(err) => {
            database.mark_ready(false);
            tracing::error!(
                error = &err as &(dyn StdError + 'static),
                address = %address,
                "Database initialisation failed, continuing with degraded readiness"
            );
            false
        }
    }
}
