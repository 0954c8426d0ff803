//! Scripted host session exercising the worker services.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use wallet_bridge_ipc::{
    ActionData, BridgeCallEvent, BroadcasterConnectionStatus, BroadcasterStartParams,
};
use wallet_bridge_relay::{BroadcasterStatusRelay, LogRelay};

use crate::config::AppConfig;
use crate::platform;
use crate::worker::PingParams;

/// What the host observed during a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub platform: String,
    pub transport: Option<String>,
    pub ping: i64,
    pub slow_ids: [u64; 2],
    pub fail_error: Option<String>,
    pub broadcaster_start: ActionData,
    pub mesh_peers: u32,
    pub status_updates: usize,
    pub statuses: BTreeMap<String, BroadcasterConnectionStatus>,
}

/// Connect to a worker per `config`, run the scripted calls and tear the
/// worker down.
#[instrument(skip_all, fields(platform = %config.platform))]
pub async fn run_host(config: &AppConfig) -> anyhow::Result<SessionReport> {
    let session = platform::connect(config)?;
    let bridge = session.bridge.clone();
    let log_relay = LogRelay::install(&bridge);
    let status_relay = BroadcasterStatusRelay::install(&bridge);
    let updates = status_relay.subscribe();
    let limit = config.call_timeout();

    let ping: i64 = bridge
        .call_with_timeout("ping", PingParams { n: 4 }, limit)
        .await?;
    info!(ping, "Worker answered ping");

    let (first, second) = tokio::join!(
        bridge.call_with_timeout::<_, u64>("slow", json!({}), limit),
        bridge.call_with_timeout::<_, u64>("slow", json!({}), limit)
    );
    let slow_ids = [first?, second?];

    let fail_error = match bridge.call_with_timeout::<_, Value>("fail", json!({}), limit).await {
        Ok(value) => {
            warn!(%value, "Failing call unexpectedly succeeded");
            None
        }
        Err(e) => Some(e.to_string()),
    };

    let start = BroadcasterStartParams {
        chain: config.chain,
        trusted_fee_signer: "0zk1qwallet-bridge-host".to_string(),
        pub_sub_topic: None,
        additional_direct_peers: config.direct_peers.clone(),
        peer_discovery_timeout: Some(100),
        poi_active_list_keys: Vec::new(),
    };
    let broadcaster_start: ActionData = bridge
        .call_with_timeout(BridgeCallEvent::BroadcasterStart, start, limit)
        .await?;
    let mesh_peers: u32 = bridge
        .call_with_timeout(BridgeCallEvent::BroadcasterGetMeshPeerCount, json!({}), limit)
        .await?;

    if mesh_peers == 0 {
        bridge.call_and_log(BridgeCallEvent::BroadcasterTryReconnect, json!({}));
    }

    let report = SessionReport {
        platform: session.platform.to_string(),
        transport: bridge.transport_name().map(str::to_string),
        ping,
        slow_ids,
        fail_error,
        broadcaster_start,
        mesh_peers,
        status_updates: updates.try_iter().count(),
        statuses: status_relay
            .statuses()
            .into_iter()
            .map(|(chain, status)| (chain.to_string(), status))
            .collect(),
    };

    status_relay.uninstall();
    log_relay.uninstall();
    session.shutdown().await;
    Ok(report)
}
