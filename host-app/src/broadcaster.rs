//! Simulated broadcaster client served by the worker.
//!
//! Stands in for the peer-to-peer broadcaster library: it tracks the active
//! chain and mesh peers, and reports connection changes and diagnostics
//! through the status and log relays.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, instrument};

use wallet_bridge_core::{BridgeCore, BridgeResult};
use wallet_bridge_ipc::{
    ActionData, BridgeCallEvent, BroadcasterConnectionStatus, BroadcasterSetChainParams,
    BroadcasterStartParams, Chain,
};
use wallet_bridge_relay::{StatusEmitter, WorkerLogger};

/// Upper bound on the simulated peer discovery wait.
const MAX_DISCOVERY_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct ClientState {
    chain: Option<Chain>,
    mesh_peers: u32,
}

/// Broadcaster client state shared by the four broadcaster call handlers.
pub struct BroadcasterClient {
    logger: WorkerLogger,
    status: StatusEmitter,
    state: Mutex<ClientState>,
}

impl BroadcasterClient {
    /// Create a new client reporting through `bridge`. It holds the bridge
    /// weakly, so the handlers that capture it do not keep the bridge alive.
    pub fn new(bridge: &BridgeCore) -> Self {
        Self {
            logger: WorkerLogger::new(bridge),
            status: StatusEmitter::new(bridge),
            state: Mutex::new(ClientState::default()),
        }
    }

    /// Join the mesh for `params.chain`.
    #[instrument(skip_all, fields(chain = %params.chain))]
    pub async fn start(&self, params: BroadcasterStartParams) -> Result<ActionData, String> {
        if params.trusted_fee_signer.is_empty() {
            return Err("Trusted fee signer required".to_string());
        }

        self.state.lock().chain = Some(params.chain);
        self.status
            .emit(params.chain, BroadcasterConnectionStatus::Searching);
        self.logger.send_waku_message(format!(
            "Starting broadcaster client on {} with {} direct peers",
            params.chain,
            params.additional_direct_peers.len()
        ));

        let wait = params
            .peer_discovery_timeout
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO)
            .min(MAX_DISCOVERY_WAIT);
        tokio::time::sleep(wait).await;

        let peers = params.additional_direct_peers.len() as u32;
        self.state.lock().mesh_peers = peers;
        self.report(params.chain, peers);
        Ok(ActionData::ok())
    }

    /// Switch to `params.chain`, keeping the current mesh.
    pub fn set_chain(&self, params: BroadcasterSetChainParams) -> Result<(), String> {
        let peers = {
            let mut state = self.state.lock();
            if state.chain.is_none() {
                return Err("Broadcaster client not started".to_string());
            }
            state.chain = Some(params.chain);
            state.mesh_peers
        };

        debug!(chain = %params.chain, "Broadcaster chain switched");
        self.report(params.chain, peers);
        Ok(())
    }

    /// Reconnect to the mesh. Failure is reported in-band.
    pub fn try_reconnect(&self) -> ActionData {
        let (chain, peers) = {
            let state = self.state.lock();
            match state.chain {
                Some(chain) => (chain, state.mesh_peers),
                None => return ActionData::failed("Broadcaster client not started"),
            }
        };

        self.status.emit(chain, BroadcasterConnectionStatus::Searching);
        self.logger.send_waku_message("Reconnecting to broadcaster mesh");
        self.report(chain, peers);
        ActionData::ok()
    }

    /// Peers found by the last start.
    pub fn mesh_peer_count(&self) -> u32 {
        self.state.lock().mesh_peers
    }

    fn report(&self, chain: Chain, peers: u32) {
        let status = if peers > 0 {
            BroadcasterConnectionStatus::Connected
        } else {
            self.logger
                .send_waku_error(format!("No broadcaster peers reachable on {chain}"));
            BroadcasterConnectionStatus::AllUnavailable
        };
        self.status.emit(chain, status);
    }
}

/// Serve the broadcaster calls on `bridge`.
pub fn register(bridge: &BridgeCore) -> BridgeResult<()> {
    let client = Arc::new(BroadcasterClient::new(bridge));

    let c = Arc::clone(&client);
    bridge.register_call(
        BridgeCallEvent::BroadcasterStart,
        move |params: BroadcasterStartParams| {
            let client = Arc::clone(&c);
            async move { client.start(params).await }
        },
    )?;

    let c = Arc::clone(&client);
    bridge.register_call(
        BridgeCallEvent::BroadcasterSetChain,
        move |params: BroadcasterSetChainParams| {
            let result = c.set_chain(params);
            async move { result }
        },
    )?;

    let c = Arc::clone(&client);
    bridge.register_call(
        BridgeCallEvent::BroadcasterTryReconnect,
        move |_: serde_json::Value| {
            let result = c.try_reconnect();
            async move { Ok::<_, String>(result) }
        },
    )?;

    bridge.register_call(
        BridgeCallEvent::BroadcasterGetMeshPeerCount,
        move |_: serde_json::Value| {
            let peers = client.mesh_peer_count();
            async move { Ok::<_, String>(peers) }
        },
    )?;

    Ok(())
}
