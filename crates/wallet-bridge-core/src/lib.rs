//! Bridge core for the wallet host/worker split.
//!
//! [`BridgeCore`] is the only component that understands the envelope
//! protocol. It correlates calls with their responses, runs registered call
//! handlers on the worker side, and routes fire-and-forget events to
//! listeners. One instance is created per process and shared by cloning.

mod bridge;
mod calls;
mod config;
mod error;
mod listeners;
mod pending;
mod state;

pub use bridge::{BridgeCore, WeakBridge};
pub use calls::CallRegistry;
pub use config::BridgeConfig;
pub use error::BridgeError;
pub use listeners::{listener_key, Listener, ListenerKey, ListenerRegistry, TypedListener};
pub use pending::{PendingCall, PendingCalls};
pub use state::BridgeState;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
