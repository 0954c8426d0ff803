//! Worker-side call registry.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::{BridgeError, BridgeResult};

/// Future returned by a type-erased handler.
pub(crate) type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;

/// Type-erased call handler.
pub(crate) type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Maps call event names to at most one handler each.
#[derive(Default)]
pub struct CallRegistry {
    handlers: RwLock<HashMap<String, Handler>>,
}

impl CallRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. A second handler for the same event is rejected.
    pub(crate) fn register(&self, event: &str, handler: Handler) -> BridgeResult<()> {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(event) {
            return Err(BridgeError::DuplicateHandler(event.to_string()));
        }
        handlers.insert(event.to_string(), handler);
        Ok(())
    }

    pub(crate) fn get(&self, event: &str) -> Option<Handler> {
        self.handlers.read().get(event).cloned()
    }

    /// Returns true if a handler is registered for `event`.
    pub fn contains(&self, event: &str) -> bool {
        self.handlers.read().contains_key(event)
    }

    /// Registered event names, sorted.
    pub fn events(&self) -> Vec<String> {
        let mut events: Vec<_> = self.handlers.read().keys().cloned().collect();
        events.sort();
        events
    }
}

/// Wrap a typed async handler into a `Value -> Value` handler.
///
/// Undecodable params, handler errors and unserializable results all become
/// the error string sent back in a `callError`.
pub(crate) fn erase<P, R, E, F, Fut>(event: &str, handler: F) -> Handler
where
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: Display + Send + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
{
    let event = event.to_string();
    Arc::new(move |payload: Value| -> HandlerFuture {
        let params = match serde_json::from_value::<P>(payload) {
            Ok(params) => params,
            Err(e) => {
                let message = format!("Invalid params for '{event}': {e}");
                return Box::pin(std::future::ready(Err(message)));
            }
        };

        let pending = handler(params);
        let event = event.clone();
        Box::pin(async move {
            let result = pending.await.map_err(|e| e.to_string())?;
            serde_json::to_value(result)
                .map_err(|e| format!("Failed to encode result of '{event}': {e}"))
        })
    })
}
