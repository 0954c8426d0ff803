//! Platform glue riding on the bridge.
//!
//! The worker reports logs and broadcaster connection changes as events;
//! the host turns them into `tracing` output and per-chain status
//! subscriptions for the UI.

mod logger;
mod status;

pub use logger::{LogRelay, WorkerLogger};
pub use status::{BroadcasterStatusRelay, StatusEmitter};
