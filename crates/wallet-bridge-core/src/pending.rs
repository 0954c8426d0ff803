//! Host-side records of calls awaiting a response.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use wallet_bridge_ipc::CorrelationId;

use crate::BridgeError;

/// What a pending call settles with.
pub(crate) type CallOutcome = Result<Value, BridgeError>;

/// A call that has been sent and not yet answered.
pub struct PendingCall {
    /// Event name the call was issued for.
    pub event: String,

    /// When the call was issued.
    pub created_at: Instant,

    continuation: oneshot::Sender<CallOutcome>,
}

impl PendingCall {
    /// Settle the call. Returns false if the caller stopped waiting.
    pub(crate) fn settle(self, outcome: CallOutcome) -> bool {
        let delivered = self.continuation.send(outcome).is_ok();
        if !delivered {
            debug!(event = %self.event, "Caller no longer waiting");
        }
        delivered
    }
}

/// Outstanding calls keyed by correlation id.
pub struct PendingCalls {
    next_id: AtomicU64,
    calls: Mutex<HashMap<CorrelationId, PendingCall>>,
}

impl PendingCalls {
    /// Create an empty table. Ids start at 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Record a new call and return its id and the receiving half.
    pub(crate) fn issue(
        &self,
        event: &str,
    ) -> (CorrelationId, oneshot::Receiver<CallOutcome>) {
        let id = CorrelationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (continuation, rx) = oneshot::channel();

        self.calls.lock().insert(
            id,
            PendingCall {
                event: event.to_string(),
                created_at: Instant::now(),
                continuation,
            },
        );

        (id, rx)
    }

    /// Remove and return the call with this id.
    pub fn take(&self, id: CorrelationId) -> Option<PendingCall> {
        self.calls.lock().remove(&id)
    }

    /// Remove and return every outstanding call.
    pub fn drain(&self) -> Vec<PendingCall> {
        self.calls.lock().drain().map(|(_, call)| call).collect()
    }

    /// Number of outstanding calls.
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns true if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}
