//! Local event dispatch.
//!
//! [`EventBus`] is the capability a cross-origin bus dispatches received
//! calls into. The surrounding application builds it and passes it in;
//! [`LocalBus`] is the in-process implementation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_core::future::BoxFuture;
use serde_json::Value;
use tracing::trace;

/// Outcome of a handler: `Ok(value)` resolves the call (`None` carries no
/// value), `Err(reason)` rejects it.
pub type HandlerResult = Result<Option<Value>, Value>;

/// An event handler.
pub type Handler = Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Wrap an async closure as a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

/// Publish/subscribe capability: register handlers by name, fire by name.
pub trait EventBus: Send + Sync {
    /// Register a handler for `event`.
    fn on(&self, event: &str, handler: Handler);

    /// Invoke the handlers registered for `event` and settle with their
    /// outcome.
    fn fire(&self, event: &str, args: Vec<Value>) -> BoxFuture<'static, HandlerResult>;
}

/// In-process event bus.
///
/// Handlers for one event run one after another in registration order. The
/// first rejection settles the call; otherwise it resolves with the value of
/// the last handler. An event without handlers resolves with no value.
#[derive(Default, Clone)]
pub struct LocalBus {
    handlers: Arc<Mutex<HashMap<String, Vec<Handler>>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        lock(&self.handlers).get(event).map_or(0, Vec::len)
    }

    /// Remove every handler registered for `event`.
    pub fn off(&self, event: &str) {
        lock(&self.handlers).remove(event);
    }
}

impl EventBus for LocalBus {
    fn on(&self, event: &str, handler: Handler) {
        lock(&self.handlers)
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }

    fn fire(&self, event: &str, args: Vec<Value>) -> BoxFuture<'static, HandlerResult> {
        let handlers = lock(&self.handlers).get(event).cloned().unwrap_or_default();
        let event = event.to_string();
        Box::pin(async move {
            trace!(event = %event, handlers = handlers.len(), "firing local event");
            let mut result = None;
            for handler in handlers {
                result = handler(args.clone()).await?;
            }
            Ok(result)
        })
    }
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = lock(&self.handlers);
        f.debug_struct("LocalBus")
            .field("events", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn lock<M>(mutex: &Mutex<M>) -> MutexGuard<'_, M> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
