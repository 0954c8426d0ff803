//! Typed host<->worker messages for the wallet bridge.
//!
//! This crate defines the envelope that crosses every transport boundary,
//! the well-known event names, and the payload types both sides agree on.

mod envelope;
mod error;
mod events;
mod types;

pub use envelope::{CorrelationId, Envelope, EnvelopeKind};
pub use error::IpcError;
pub use events::{BridgeCallEvent, BridgeEvent};
pub use types::{
    ActionData, BroadcasterConnectionStatus, BroadcasterSetChainParams, BroadcasterStartParams,
    BroadcasterStatusCallbackData, Chain, ChainType, ErrorPayload,
};

/// Result type for envelope encoding and validation.
pub type IpcResult<T> = Result<T, IpcError>;
