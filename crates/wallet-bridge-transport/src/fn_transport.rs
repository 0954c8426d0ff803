//! Transport assembled from a send function and a receive-registration
//! function.

use parking_lot::Mutex;

use wallet_bridge_ipc::Envelope;

use crate::{Dispatcher, Transport, TransportError, TransportResult};

type SendFn = Box<dyn Fn(Envelope) + Send + Sync>;
type RegisterFn = Box<dyn FnOnce(Dispatcher) + Send>;

/// Wraps host-provided `send` and `register receive` primitives.
pub struct FnTransport {
    send_fn: SendFn,
    register_fn: Mutex<Option<RegisterFn>>,
}

impl FnTransport {
    /// Build a transport from the two primitives.
    pub fn new<S, R>(send_fn: S, register_receive_fn: R) -> Self
    where
        S: Fn(Envelope) + Send + Sync + 'static,
        R: FnOnce(Dispatcher) + Send + 'static,
    {
        Self {
            send_fn: Box::new(send_fn),
            register_fn: Mutex::new(Some(Box::new(register_receive_fn))),
        }
    }
}

impl Transport for FnTransport {
    fn name(&self) -> &'static str {
        "fn"
    }

    fn send(&self, envelope: Envelope) {
        (self.send_fn)(envelope)
    }

    fn on_receive(&self, dispatcher: Dispatcher) -> TransportResult<()> {
        let register = self
            .register_fn
            .lock()
            .take()
            .ok_or(TransportError::DispatcherAlreadySet)?;
        register(dispatcher);
        Ok(())
    }
}
