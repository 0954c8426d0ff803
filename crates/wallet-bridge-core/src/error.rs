//! Error types for the bridge core.

use std::time::Duration;

use thiserror::Error;

use wallet_bridge_transport::TransportError;

/// Errors surfaced by bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// `setup` has not been called yet.
    #[error("Bridge not set up")]
    NotReady,

    /// `setup` was called a second time.
    #[error("Bridge already set up")]
    AlreadyInitialized,

    /// `setup` was called outside a Tokio runtime.
    #[error("No Tokio runtime available for call handlers")]
    NoRuntime,

    /// A handler is already registered for this event.
    #[error("Handler already registered for '{0}'")]
    DuplicateHandler(String),

    /// The remote handler failed. Displays the handler's own message.
    #[error("{0}")]
    Remote(String),

    /// Call parameters could not be serialized.
    #[error("Failed to encode params for '{event}': {source}")]
    Encode {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    /// The call result did not match the expected type.
    #[error("Failed to decode result of '{event}': {source}")]
    Decode {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    /// No response within the caller's deadline.
    #[error("Call '{event}' timed out after {after:?}")]
    Timeout { event: String, after: Duration },

    /// The worker crashed while the call was outstanding.
    #[error("Worker crashed: {0}")]
    WorkerCrashed(String),

    /// The pending call was dropped without being settled.
    #[error("Call '{0}' abandoned")]
    Abandoned(String),

    /// Transport wiring failed.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
