//! Same-process worker channel.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info};

use wallet_bridge_ipc::Envelope;

use crate::{DispatchSlot, Dispatcher, Transport, TransportError, TransportResult};

/// One end of an in-process channel to a worker thread.
///
/// Envelopes cross as JSON text, like a structured-clone `postMessage`, so
/// both ends only ever share serialized values.
pub struct WorkerChannelTransport {
    name: &'static str,
    tx: Sender<String>,
    rx: Mutex<Option<Receiver<String>>>,
    slot: Arc<DispatchSlot>,
}

/// Create a connected (host, worker) pair.
pub fn worker_channel_pair() -> (WorkerChannelTransport, WorkerChannelTransport) {
    let (host_tx, worker_rx) = crossbeam_channel::unbounded();
    let (worker_tx, host_rx) = crossbeam_channel::unbounded();

    (
        WorkerChannelTransport::new("worker-channel-host", host_tx, host_rx),
        WorkerChannelTransport::new("worker-channel-worker", worker_tx, worker_rx),
    )
}

impl WorkerChannelTransport {
    fn new(name: &'static str, tx: Sender<String>, rx: Receiver<String>) -> Self {
        Self {
            name,
            tx,
            rx: Mutex::new(Some(rx)),
            slot: Arc::new(DispatchSlot::new()),
        }
    }
}

impl Transport for WorkerChannelTransport {
    fn name(&self) -> &'static str {
        self.name
    }

    fn send(&self, envelope: Envelope) {
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                self.slot
                    .report_error(self.name, format!("Failed to encode '{}': {}", envelope.event, e));
                return;
            }
        };

        if self.tx.send(text).is_err() {
            self.slot.report_error(
                self.name,
                format!("Worker channel closed, '{}' not delivered", envelope.event),
            );
        }
    }

    fn on_receive(&self, dispatcher: Dispatcher) -> TransportResult<()> {
        self.slot.set(dispatcher)?;
        let rx = self
            .rx
            .lock()
            .take()
            .ok_or(TransportError::DispatcherAlreadySet)?;

        let slot = Arc::clone(&self.slot);
        let name = self.name;
        thread::Builder::new()
            .name(format!("{name}-rx"))
            .spawn(move || {
                debug!(transport = name, "Receive loop starting");
                for text in rx.iter() {
                    slot.deliver_text(name, &text);
                }
                info!(transport = name, "Peer disconnected, receive loop stopped");
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wallet_bridge_ipc::{BridgeEvent, CorrelationId};

    fn collect(transport: &WorkerChannelTransport) -> crossbeam_channel::Receiver<Envelope> {
        let (tx, rx) = crossbeam_channel::unbounded();
        transport
            .on_receive(Arc::new(move |envelope| {
                let _ = tx.send(envelope);
            }))
            .unwrap();
        rx
    }

    #[test]
    fn test_delivers_in_send_order() {
        let (host, worker) = worker_channel_pair();
        let inbox = collect(&worker);

        for n in 0..50u64 {
            host.send(Envelope::call("ping", CorrelationId(n), json!({ "n": n })));
        }

        for n in 0..50u64 {
            let envelope = inbox.recv_timeout(Duration::from_secs(1)).unwrap();
            assert_eq!(envelope.correlation_id, Some(CorrelationId(n)));
            assert_eq!(envelope.payload, json!({ "n": n }));
        }
    }

    #[test]
    fn test_second_on_receive_fails() {
        let (host, _worker) = worker_channel_pair();
        let _inbox = collect(&host);
        let err = host.on_receive(Arc::new(|_| {})).unwrap_err();
        assert!(matches!(err, TransportError::DispatcherAlreadySet));
    }

    #[test]
    fn test_send_to_dropped_peer_reports_error_event() {
        let (host, worker) = worker_channel_pair();
        let inbox = collect(&host);
        drop(worker);

        host.send(Envelope::event("message", json!("lost")));

        let envelope = inbox.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(envelope.event, BridgeEvent::Error.as_str());
    }
}
