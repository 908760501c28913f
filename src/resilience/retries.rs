//! Retry runner for fallible startup work.
//!
//! # Responsibilities
//! - Run a unit of work until it succeeds or the policy gives up
//! - Log every failed attempt before deciding whether to retry
//! - Surface the last error unchanged once attempts or budget run out
//!
//! # Design Decisions
//! - Intended for startup steps (database reachability, schema setup)
//! - Sleeps never exceed the remaining budget; a zero remaining delay retries
//!   immediately and still consumes an attempt
//! - The cancellable variant stops waiting when shutdown is signalled

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::resilience::backoff::{Backoff, RetryPolicy};

/// Run `operation` under `policy`, returning its first success or last error.
pub async fn run_with_retry<T, E, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    retry_loop(policy, operation, std::future::pending::<()>()).await
}

/// Like [`run_with_retry`], but gives up early once `shutdown` fires.
pub async fn run_with_retry_until_shutdown<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: F,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let cancelled = async move {
        let _ = shutdown.recv().await;
    };
    retry_loop(policy, operation, cancelled).await
}

async fn retry_loop<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    mut operation: F,
    cancelled: C,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    C: Future<Output = ()>,
{
    tokio::pin!(cancelled);
    let mut slept = Duration::ZERO;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        tracing::warn!(
            attempt,
            max_attempts = policy.max_attempts,
            error = %err,
            "Transient operation failed"
        );

        match policy.after_failure(attempt, slept) {
            Backoff::GiveUp => return Err(err),
            Backoff::Immediate => continue,
            Backoff::Sleep(delay) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => slept += delay,
                    _ = &mut cancelled => {
                        tracing::warn!(attempt, "Retry cancelled by shutdown");
                        return Err(err);
                    }
                }
            }
        }
    }
}
