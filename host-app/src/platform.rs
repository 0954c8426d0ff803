//! Platform-specific wiring between the host bridge and its worker.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Context;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{error, info, instrument, warn};

use wallet_bridge_core::{BridgeConfig, BridgeCore};
use wallet_bridge_transport::{
    restricted_api_pair, worker_channel_pair, ChildProcessTransport, ContextBridgeTransport,
    DEFAULT_BRIDGE_CHANNEL,
};

use crate::config::{AppConfig, Platform};
use crate::worker;

/// The worker half of a connection, kept alive for the session.
enum WorkerHandle {
    /// Worker core on its own thread and runtime.
    Thread {
        shutdown: oneshot::Sender<()>,
        thread: JoinHandle<()>,
    },

    /// Embedded runtime in a child process.
    Process(Arc<ChildProcessTransport>),

    /// Privileged context in this process.
    Privileged(BridgeCore),
}

/// A ready host bridge and the worker behind it.
pub struct HostSession {
    pub bridge: BridgeCore,
    pub platform: Platform,
    worker: WorkerHandle,
}

impl HostSession {
    /// Tear down the worker side.
    pub async fn shutdown(self) {
        match self.worker {
            WorkerHandle::Thread { shutdown, thread } => {
                let _ = shutdown.send(());
                let joined = tokio::task::spawn_blocking(move || thread.join()).await;
                if !matches!(joined, Ok(Ok(()))) {
                    warn!("Worker thread did not exit cleanly");
                }
            }
            WorkerHandle::Process(child) => {
                if let Err(e) = child.kill() {
                    warn!("Failed to stop worker process: {}", e);
                }
                child.closed().await;
            }
            WorkerHandle::Privileged(_) => {}
        }
        info!(platform = %self.platform, "Worker stopped");
    }
}

/// Start the worker for `config.platform` and set up a host bridge to it.
#[instrument(skip_all, fields(platform = %config.platform))]
pub fn connect(config: &AppConfig) -> anyhow::Result<HostSession> {
    let bridge = BridgeCore::new(config.bridge.clone());

    let worker = match config.platform {
        Platform::Web => connect_worker_thread(&bridge)?,
        Platform::Mobile => connect_child_process(&bridge, &config.log_filter)?,
        Platform::Desktop => connect_context_bridge(&bridge)?,
    };

    info!(transport = ?bridge.transport_name(), "Host bridge connected");
    Ok(HostSession {
        bridge,
        platform: config.platform,
        worker,
    })
}

fn connect_worker_thread(bridge: &BridgeCore) -> anyhow::Result<WorkerHandle> {
    let (host_end, worker_end) = worker_channel_pair();
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<anyhow::Result<()>>(1);

    let thread = thread::Builder::new()
        .name("bridge-worker".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
            };

            runtime.block_on(async move {
                let worker = BridgeCore::new(BridgeConfig::default());
                let started = worker::register_services(&worker)
                    .and_then(|()| worker.setup(Arc::new(worker_end)));
                let failed = started.is_err();
                let _ = ready_tx.send(started.map_err(Into::into));
                if failed {
                    return;
                }

                info!("Worker thread serving");
                let _ = shutdown_rx.await;
            });
        })
        .context("Failed to spawn worker thread")?;

    ready_rx
        .recv()
        .context("Worker thread exited during startup")?
        .context("Worker thread failed to start")?;

    bridge.setup(Arc::new(host_end))?;
    Ok(WorkerHandle::Thread { shutdown, thread })
}

fn connect_child_process(bridge: &BridgeCore, log_filter: &str) -> anyhow::Result<WorkerHandle> {
    let exe = std::env::current_exe().context("Failed to locate own executable")?;
    let mut command = Command::new(exe);
    command.arg("worker").env("RUST_LOG", log_filter);

    let child = Arc::new(ChildProcessTransport::spawn(command).context("Failed to spawn worker")?);
    info!(pid = ?child.id(), "Worker process started");

    bridge.setup(child.clone())?;
    Ok(WorkerHandle::Process(child))
}

fn connect_context_bridge(bridge: &BridgeCore) -> anyhow::Result<WorkerHandle> {
    let (isolated, privileged) = restricted_api_pair(&[DEFAULT_BRIDGE_CHANNEL]);

    let worker = BridgeCore::new(BridgeConfig::default());
    worker::register_services(&worker)?;
    worker.setup(Arc::new(ContextBridgeTransport::new(
        Arc::new(privileged),
        DEFAULT_BRIDGE_CHANNEL,
    )))?;

    if let Err(e) = bridge.setup(Arc::new(ContextBridgeTransport::new(
        Arc::new(isolated),
        DEFAULT_BRIDGE_CHANNEL,
    ))) {
        error!("Isolated context bridge failed: {}", e);
        return Err(e.into());
    }

    Ok(WorkerHandle::Privileged(worker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::PingParams;

    async fn ping_over(platform: Platform) {
        let config = AppConfig {
            platform,
            ..Default::default()
        };
        let session = connect(&config).unwrap();

        let n: i64 = session
            .bridge
            .call_with_timeout("ping", PingParams { n: 4 }, config.call_timeout())
            .await
            .unwrap();
        assert_eq!(n, 5);

        session.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_web_platform_round_trip() {
        ping_over(Platform::Web).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_desktop_platform_round_trip() {
        ping_over(Platform::Desktop).await;
    }
}
