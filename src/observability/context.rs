//! Per-request context store.
//!
//! # Responsibilities
//! - Hold the correlation ID of the request being served
//! - Accumulate key/value context (method, path, status, timings, ...)
//! - Expose a snapshot to the log formatter
//!
//! # Design Decisions
//! - Backed by a Tokio task-local, entered once per request with [`scope`]
//! - The store is owned by the request future, so it is dropped on every exit
//!   path (response, panic unwinding, cancellation)
//! - Outside a scope, reads return empty values and writes are no-ops

use std::cell::RefCell;
use std::future::Future;

use serde_json::{Map, Value};

/// Context key under which the correlation ID is mirrored.
pub const REQUEST_ID_KEY: &str = "request_id";

tokio::task_local! {
    static REQUEST_CONTEXT: RefCell<RequestContext>;
}

/// Context accumulated for a single inbound request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    correlation_id: Option<String>,
    fields: Map<String, Value>,
}

impl RequestContext {
    /// Correlation ID bound to the request, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Accumulated context fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn merge(&mut self, partial: Map<String, Value>) {
        for (key, value) in partial {
            if !value.is_null() {
                self.fields.insert(key, value);
            }
        }
    }
}

/// Run `fut` with a fresh, empty context store.
pub async fn scope<F>(fut: F) -> F::Output
where
    F: Future,
{
    REQUEST_CONTEXT
        .scope(RefCell::new(RequestContext::default()), fut)
        .await
}

/// Synchronous counterpart of [`scope`].
pub fn sync_scope<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    REQUEST_CONTEXT.sync_scope(RefCell::new(RequestContext::default()), f)
}

/// Bind a correlation ID to the current request.
pub fn set_correlation_id(id: impl Into<String>) {
    let id = id.into();
    let _ = REQUEST_CONTEXT.try_with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        ctx.fields
            .insert(REQUEST_ID_KEY.to_string(), Value::String(id.clone()));
        ctx.correlation_id = Some(id);
    });
}

/// Correlation ID of the current request.
pub fn correlation_id() -> Option<String> {
    REQUEST_CONTEXT
        .try_with(|ctx| ctx.borrow().correlation_id.clone())
        .ok()
        .flatten()
}

/// Merge `partial` into the current context. Null values are ignored.
pub fn merge_context(partial: Map<String, Value>) {
    let _ = REQUEST_CONTEXT.try_with(|ctx| ctx.borrow_mut().merge(partial));
}

/// Merge a single key. `None`/null values are ignored.
pub fn merge_field(key: impl Into<String>, value: impl Into<Value>) {
    let mut partial = Map::new();
    partial.insert(key.into(), value.into());
    merge_context(partial);
}

/// Snapshot of the current context fields.
pub fn get_context() -> Map<String, Value> {
    REQUEST_CONTEXT
        .try_with(|ctx| ctx.borrow().fields.clone())
        .unwrap_or_default()
}

/// Snapshot of the whole store, correlation ID included.
pub fn snapshot() -> RequestContext {
    REQUEST_CONTEXT
        .try_with(|ctx| ctx.borrow().clone())
        .unwrap_or_default()
}

/// Drop every value held for the current request.
pub fn clear() {
    let _ = REQUEST_CONTEXT.try_with(|ctx| {
        *ctx.borrow_mut() = RequestContext::default();
    });
}
