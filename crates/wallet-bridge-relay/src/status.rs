//! Broadcaster connection status relay.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use wallet_bridge_core::{BridgeCore, TypedListener, WeakBridge};
use wallet_bridge_ipc::{
    BridgeEvent, BroadcasterConnectionStatus, BroadcasterStatusCallbackData, Chain,
};

/// Worker-side sender of broadcaster status changes.
///
/// Holds the bridge weakly, like [`WorkerLogger`](crate::WorkerLogger).
#[derive(Clone)]
pub struct StatusEmitter {
    bridge: WeakBridge,
}

impl StatusEmitter {
    /// Create a new emitter sending through `bridge`.
    pub fn new(bridge: &BridgeCore) -> Self {
        Self {
            bridge: bridge.downgrade(),
        }
    }

    /// Report `status` for `chain` to the host.
    pub fn emit(&self, chain: Chain, status: BroadcasterConnectionStatus) {
        match self.bridge.upgrade() {
            Some(bridge) => bridge.trigger_event(
                BridgeEvent::OnBroadcasterStatusCallback,
                BroadcasterStatusCallbackData { chain, status },
            ),
            None => debug!(%chain, ?status, "Bridge dropped, status discarded"),
        }
    }
}

#[derive(Default)]
struct StatusBoard {
    latest: RwLock<HashMap<Chain, BroadcasterConnectionStatus>>,
    subscribers: Mutex<Vec<Sender<BroadcasterStatusCallbackData>>>,
}

impl StatusBoard {
    fn update(&self, data: BroadcasterStatusCallbackData) {
        let previous = self.latest.write().insert(data.chain, data.status);
        if previous != Some(data.status) {
            info!(chain = %data.chain, status = ?data.status, "Broadcaster status changed");
        }

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(data).is_ok());
    }
}

/// Host-side tracker of the latest broadcaster status per chain.
///
/// Every status event updates the board and is fanned out to subscribers.
/// Subscribers whose receiver was dropped are pruned on the next update.
pub struct BroadcasterStatusRelay {
    bridge: BridgeCore,
    board: Arc<StatusBoard>,
    listener: Option<TypedListener<BroadcasterStatusCallbackData>>,
}

impl BroadcasterStatusRelay {
    /// Start tracking status events received by `bridge`.
    pub fn install(bridge: &BridgeCore) -> Self {
        let board = Arc::new(StatusBoard::default());
        let listener: TypedListener<BroadcasterStatusCallbackData> = {
            let board = Arc::clone(&board);
            Arc::new(move |data: BroadcasterStatusCallbackData| board.update(data))
        };
        bridge.listen_typed(BridgeEvent::OnBroadcasterStatusCallback, &listener);
        debug!("Broadcaster status relay installed");

        Self {
            bridge: bridge.clone(),
            board,
            listener: Some(listener),
        }
    }

    /// Receive every status update from now on.
    pub fn subscribe(&self) -> Receiver<BroadcasterStatusCallbackData> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.board.subscribers.lock().push(tx);
        rx
    }

    /// Latest known status for `chain`.
    pub fn status(&self, chain: Chain) -> Option<BroadcasterConnectionStatus> {
        self.board.latest.read().get(&chain).copied()
    }

    /// Latest known status for every chain seen so far.
    pub fn statuses(&self) -> HashMap<Chain, BroadcasterConnectionStatus> {
        self.board.latest.read().clone()
    }

    /// Number of subscribers not yet pruned.
    pub fn subscriber_count(&self) -> usize {
        self.board.subscribers.lock().len()
    }

    /// Stop tracking. Existing subscribers receive no further updates.
    pub fn uninstall(mut self) {
        self.remove_listener();
    }

    fn remove_listener(&mut self) {
        if let Some(listener) = self.listener.take() {
            self.bridge
                .remove_listener(BridgeEvent::OnBroadcasterStatusCallback, &listener);
            debug!("Broadcaster status relay uninstalled");
        }
    }
}

impl Drop for BroadcasterStatusRelay {
    fn drop(&mut self) {
        self.remove_listener();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::loopback;
    use serde_json::json;

    #[tokio::test]
    async fn test_latest_status_per_chain() {
        let bridge = loopback();
        let relay = BroadcasterStatusRelay::install(&bridge);
        let emitter = StatusEmitter::new(&bridge);

        emitter.emit(Chain::evm(1), BroadcasterConnectionStatus::Searching);
        emitter.emit(Chain::evm(137), BroadcasterConnectionStatus::Connected);
        emitter.emit(Chain::evm(1), BroadcasterConnectionStatus::AllUnavailable);

        assert_eq!(
            relay.status(Chain::evm(1)),
            Some(BroadcasterConnectionStatus::AllUnavailable)
        );
        assert_eq!(
            relay.status(Chain::evm(137)),
            Some(BroadcasterConnectionStatus::Connected)
        );
        assert_eq!(relay.status(Chain::evm(56)), None);
        assert_eq!(relay.statuses().len(), 2);
    }

    #[tokio::test]
    async fn test_subscribers_receive_updates_and_are_pruned() {
        let bridge = loopback();
        let relay = BroadcasterStatusRelay::install(&bridge);
        let emitter = StatusEmitter::new(&bridge);

        let kept = relay.subscribe();
        let dropped = relay.subscribe();
        drop(dropped);
        assert_eq!(relay.subscriber_count(), 2);

        emitter.emit(Chain::evm(1), BroadcasterConnectionStatus::Connected);

        assert_eq!(
            kept.try_recv().unwrap(),
            BroadcasterStatusCallbackData {
                chain: Chain::evm(1),
                status: BroadcasterConnectionStatus::Connected,
            }
        );
        assert_eq!(relay.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_status_ignored() {
        let bridge = loopback();
        let relay = BroadcasterStatusRelay::install(&bridge);

        bridge.trigger_event(
            BridgeEvent::OnBroadcasterStatusCallback,
            json!({ "chain": "mainnet", "status": "Connected" }),
        );

        assert!(relay.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_uninstall_removes_listener() {
        let bridge = loopback();
        let relay = BroadcasterStatusRelay::install(&bridge);
        assert_eq!(
            bridge.listener_count(BridgeEvent::OnBroadcasterStatusCallback),
            1
        );

        let updates = relay.subscribe();
        relay.uninstall();
        assert_eq!(
            bridge.listener_count(BridgeEvent::OnBroadcasterStatusCallback),
            0
        );

        StatusEmitter::new(&bridge).emit(Chain::evm(1), BroadcasterConnectionStatus::Connected);
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_emitter_after_bridge_dropped_is_noop() {
        let bridge = BridgeCore::default();
        let emitter = StatusEmitter::new(&bridge);
        drop(bridge);

        emitter.emit(Chain::evm(1), BroadcasterConnectionStatus::Error);
    }
}
