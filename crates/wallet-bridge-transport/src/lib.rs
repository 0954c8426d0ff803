//! Transport adapters for the wallet bridge.
//!
//! A transport moves envelopes across one execution boundary in both
//! directions. Three adapters are provided:
//!
//! - [`worker_channel_pair`]: same-process worker thread channel.
//! - [`ChildProcessTransport`] / [`LineTransport`]: newline-delimited JSON
//!   over a child process' stdio.
//! - [`ContextBridgeTransport`]: an isolated context talking through a
//!   restricted API surface.
//!
//! All of them satisfy [`Transport`], so the bridge core never knows which
//! one it is wired to.

mod child_process;
mod context_bridge;
mod dispatch;
mod error;
mod fn_transport;
mod worker_channel;

use std::sync::Arc;

pub use child_process::{ChildProcessTransport, CloseBehavior, LineTransport};
pub use context_bridge::{
    restricted_api_pair, ChannelCallback, ContextBridgeTransport, ExposedApi, RestrictedApi,
};
pub use dispatch::DispatchSlot;
pub use error::TransportError;
pub use fn_transport::FnTransport;
pub use worker_channel::{worker_channel_pair, WorkerChannelTransport};

use wallet_bridge_ipc::Envelope;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Inbound envelope callback installed by the bridge core.
pub type Dispatcher = Arc<dyn Fn(Envelope) + Send + Sync>;

/// Channel name used on the restricted context bridge API.
pub const DEFAULT_BRIDGE_CHANNEL: &str = "wallet-bridge";

/// Moves envelopes across an execution boundary.
pub trait Transport: Send + Sync {
    /// Adapter name for logging.
    fn name(&self) -> &'static str;

    /// Serialize and transmit an envelope.
    ///
    /// Never fails synchronously. Delivery failures are reported as a local
    /// `error` event through the registered dispatcher.
    fn send(&self, envelope: Envelope);

    /// Install the single inbound dispatcher.
    ///
    /// Envelopes from one sender are delivered in send order.
    fn on_receive(&self, dispatcher: Dispatcher) -> TransportResult<()>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn send(&self, envelope: Envelope) {
        (**self).send(envelope)
    }

    fn on_receive(&self, dispatcher: Dispatcher) -> TransportResult<()> {
        (**self).on_receive(dispatcher)
    }
}
