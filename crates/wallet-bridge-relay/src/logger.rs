//! Worker log forwarding.

use std::fmt::Display;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info};

use wallet_bridge_core::{BridgeCore, Listener, WeakBridge};
use wallet_bridge_ipc::{BridgeEvent, ErrorPayload};

/// Worker-side sender of log events.
///
/// Holds the bridge weakly, so it can live inside the bridge's own call
/// handlers. Once the bridge is gone, log events are discarded.
#[derive(Clone)]
pub struct WorkerLogger {
    bridge: WeakBridge,
}

impl WorkerLogger {
    /// Create a new logger sending through `bridge`.
    pub fn new(bridge: &BridgeCore) -> Self {
        Self {
            bridge: bridge.downgrade(),
        }
    }

    /// Informational message.
    pub fn send_message(&self, message: impl AsRef<str>) {
        if let Some(bridge) = self.bridge() {
            bridge.trigger_event(BridgeEvent::Message, message.as_ref());
        }
    }

    /// Error report.
    pub fn send_error(&self, error: impl Display) {
        if let Some(bridge) = self.bridge() {
            bridge.trigger_event(BridgeEvent::Error, ErrorPayload::new(error.to_string()));
        }
    }

    /// Message from the broadcaster client.
    pub fn send_waku_message(&self, message: impl AsRef<str>) {
        if let Some(bridge) = self.bridge() {
            bridge.trigger_event(BridgeEvent::WakuMessage, message.as_ref());
        }
    }

    /// Error from the broadcaster client.
    pub fn send_waku_error(&self, error: impl Display) {
        if let Some(bridge) = self.bridge() {
            bridge.trigger_event(BridgeEvent::WakuError, ErrorPayload::new(error.to_string()));
        }
    }

    fn bridge(&self) -> Option<BridgeCore> {
        let bridge = self.bridge.upgrade();
        if bridge.is_none() {
            debug!("Bridge dropped, log event discarded");
        }
        bridge
    }
}

/// Host-side forwarding of worker log events into `tracing`.
///
/// Dropping the relay has the same effect as [`uninstall`](Self::uninstall).
pub struct LogRelay {
    bridge: BridgeCore,
    installed: Vec<(BridgeEvent, Listener)>,
}

impl LogRelay {
    /// Start forwarding worker logs received by `bridge`.
    pub fn install(bridge: &BridgeCore) -> Self {
        let installed: Vec<(BridgeEvent, Listener)> = vec![
            (
                BridgeEvent::Message,
                Arc::new(|payload: &Value| info!(source = "worker", "{}", text(payload))),
            ),
            (
                BridgeEvent::WakuMessage,
                Arc::new(|payload: &Value| info!(source = "waku", "{}", text(payload))),
            ),
            (
                BridgeEvent::Error,
                Arc::new(|payload: &Value| error!(source = "worker", "{}", text(payload))),
            ),
            (
                BridgeEvent::WakuError,
                Arc::new(|payload: &Value| error!(source = "waku", "{}", text(payload))),
            ),
            (
                BridgeEvent::UncaughtException,
                Arc::new(|payload: &Value| {
                    error!(source = "worker", "Uncaught exception: {}", text(payload))
                }),
            ),
        ];

        for (event, listener) in &installed {
            bridge.listen(event, Arc::clone(listener));
        }
        debug!(listeners = installed.len(), "Log relay installed");

        Self {
            bridge: bridge.clone(),
            installed,
        }
    }

    /// Stop forwarding. Only this relay's listeners are removed.
    pub fn uninstall(mut self) {
        self.remove_listeners();
    }

    fn remove_listeners(&mut self) {
        if self.installed.is_empty() {
            return;
        }
        for (event, listener) in self.installed.drain(..) {
            self.bridge.remove_listener(event, &listener);
        }
        debug!("Log relay uninstalled");
    }
}

impl Drop for LogRelay {
    fn drop(&mut self) {
        self.remove_listeners();
    }
}

/// Printable text of a log payload: bare strings, `{ message }` objects, or
/// anything else as JSON.
fn text(payload: &Value) -> String {
    match payload {
        Value::String(message) => message.clone(),
        Value::Object(fields) => match fields.get("message") {
            Some(Value::String(message)) => message.clone(),
            _ => payload.to_string(),
        },
        other => other.to_string(),
    }
}
