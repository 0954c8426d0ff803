//! Inbound dispatcher slot shared by every adapter.

use std::sync::OnceLock;

use tracing::{debug, warn};

use wallet_bridge_ipc::{BridgeEvent, Envelope, ErrorPayload};

use crate::{Dispatcher, TransportError, TransportResult};

/// Holds the one inbound dispatcher of a transport.
///
/// Adapters also route their own failures through it, as local `error` and
/// `uncaughtException` events, so send errors surface asynchronously.
#[derive(Default)]
pub struct DispatchSlot {
    dispatcher: OnceLock<Dispatcher>,
}

impl DispatchSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the dispatcher. Fails if one is already installed.
    pub fn set(&self, dispatcher: Dispatcher) -> TransportResult<()> {
        self.dispatcher
            .set(dispatcher)
            .map_err(|_| TransportError::DispatcherAlreadySet)
    }

    /// Returns true once a dispatcher is installed.
    pub fn is_set(&self) -> bool {
        self.dispatcher.get().is_some()
    }

    /// Hand an envelope to the dispatcher. Returns false if none is installed.
    pub fn dispatch(&self, envelope: Envelope) -> bool {
        match self.dispatcher.get() {
            Some(dispatcher) => {
                dispatcher(envelope);
                true
            }
            None => {
                warn!(event = %envelope.event, "No dispatcher installed, dropping envelope");
                false
            }
        }
    }

    /// Parse wire text and dispatch it. Malformed text is logged and dropped.
    pub fn deliver_text(&self, transport: &str, text: &str) {
        match Envelope::from_json(text) {
            Ok(envelope) => {
                debug!(
                    transport,
                    event = %envelope.event,
                    kind = ?envelope.kind,
                    "Envelope received"
                );
                self.dispatch(envelope);
            }
            Err(e) => warn!(transport, "Dropping malformed message: {}", e),
        }
    }

    /// Surface a delivery failure as a local `error` event.
    pub fn report_error(&self, transport: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(transport, "Transport error: {}", message);
        self.dispatch(local_event(BridgeEvent::Error, message));
    }

    /// Surface a lost worker as a local `uncaughtException` event.
    pub fn report_crash(&self, transport: &str, message: impl Into<String>) {
        let message = message.into();
        warn!(transport, "Worker lost: {}", message);
        self.dispatch(local_event(BridgeEvent::UncaughtException, message));
    }
}

fn local_event(event: BridgeEvent, message: String) -> Envelope {
    let payload = serde_json::to_value(ErrorPayload::new(message)).unwrap_or_default();
    Envelope::event(event.as_str(), payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn recording_slot() -> (DispatchSlot, Arc<Mutex<Vec<Envelope>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let slot = DispatchSlot::new();
        let sink = Arc::clone(&seen);
        slot.set(Arc::new(move |envelope| sink.lock().push(envelope)))
            .unwrap();
        (slot, seen)
    }

    #[test]
    fn test_second_dispatcher_rejected() {
        let (slot, _) = recording_slot();
        let err = slot.set(Arc::new(|_| {})).unwrap_err();
        assert!(matches!(err, TransportError::DispatcherAlreadySet));
    }

    #[test]
    fn test_malformed_text_dropped() {
        let (slot, seen) = recording_slot();
        slot.deliver_text("test", "not json");
        slot.deliver_text("test", r#"{"event":"message","kind":"event","result":"ok"}"#);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].event, "message");
    }

    #[test]
    fn test_report_error_dispatches_error_event() {
        let (slot, seen) = recording_slot();
        slot.report_error("test", "pipe closed");

        let seen = seen.lock();
        assert_eq!(seen[0].event, BridgeEvent::Error.as_str());
        assert_eq!(seen[0].payload["message"], "pipe closed");
    }

    #[test]
    fn test_dispatch_without_dispatcher() {
        let slot = DispatchSlot::new();
        assert!(!slot.is_set());
        assert!(!slot.dispatch(Envelope::event("message", serde_json::Value::Null)));
    }
}
