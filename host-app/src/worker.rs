//! Worker-side services.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use wallet_bridge_core::{BridgeConfig, BridgeCore, BridgeResult};
use wallet_bridge_relay::WorkerLogger;
use wallet_bridge_transport::LineTransport;

use crate::broadcaster;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PingParams {
    pub n: i64,
}

/// Register every worker service on `bridge`.
pub fn register_services(bridge: &BridgeCore) -> BridgeResult<()> {
    bridge.register_call("ping", |params: PingParams| async move {
        Ok::<_, String>(params.n + 1)
    })?;

    bridge.register_call("fail", |_: Value| async move {
        Err::<Value, _>("boom".to_string())
    })?;

    let invocations = Arc::new(AtomicU64::new(0));
    bridge.register_call("slow", move |_: Value| {
        let id = invocations.fetch_add(1, Ordering::Relaxed) + 1;
        async move {
            tokio::task::yield_now().await;
            Ok::<_, String>(id)
        }
    })?;

    broadcaster::register(bridge)
}

/// Serve the bridge over this process' stdin/stdout until the host closes
/// the stream.
#[instrument(name = "worker_process")]
pub async fn run_stdio_worker() -> anyhow::Result<()> {
    let transport = Arc::new(LineTransport::stdio()?);
    let bridge = BridgeCore::new(BridgeConfig::default());
    register_services(&bridge)?;
    bridge.setup(transport.clone())?;

    info!(pid = std::process::id(), "Worker serving on stdio");
    WorkerLogger::new(&bridge).send_message("Worker ready");

    transport.closed().await;
    info!("Host closed the bridge, worker exiting");
    Ok(())
}
