//! Error types for the transport module.

use thiserror::Error;

use wallet_bridge_ipc::IpcError;

/// Errors that can occur while wiring or driving a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// An inbound dispatcher is already installed.
    #[error("Inbound dispatcher already registered")]
    DispatcherAlreadySet,

    /// The adapter needs a Tokio runtime and none is running.
    #[error("No Tokio runtime available")]
    NoRuntime,

    /// The channel is not on the exposed API's allow list.
    #[error("Channel not allowed: {0}")]
    ChannelNotAllowed(String),

    /// The channel already has a subscriber.
    #[error("Channel already subscribed: {0}")]
    AlreadySubscribed(String),

    /// The other side went away.
    #[error("Channel closed")]
    ChannelClosed,

    /// A child process pipe was not captured.
    #[error("Child process has no {0} pipe")]
    MissingPipe(&'static str),

    /// Envelope could not be encoded.
    #[error("Encode error: {0}")]
    Encode(#[from] IpcError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
