//! Application configuration.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use wallet_bridge_core::BridgeConfig;
use wallet_bridge_ipc::Chain;

/// Default `EnvFilter` directives when neither `RUST_LOG` nor the config
/// file sets one.
pub const DEFAULT_LOG_FILTER: &str = "wallet_bridge=info,wallet_bridge_lib=info,wallet_bridge_core=info,wallet_bridge_transport=info,wallet_bridge_relay=info";

/// Where the worker runtime lives relative to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Isolated rendering context talking to a privileged context.
    #[default]
    Desktop,

    /// Embedded runtime in a child process.
    Mobile,

    /// Worker thread.
    Web,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Web => "web",
        };
        f.write_str(name)
    }
}

/// Host configuration, loaded from a JSON file and overridden by CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub platform: Platform,
    pub bridge: BridgeConfig,

    /// Chain the broadcaster client starts on.
    pub chain: Chain,

    pub log_filter: String,

    /// Deadline for calls made by the host session, in milliseconds.
    pub call_timeout_ms: u64,

    /// Peers handed to the broadcaster client on start.
    pub direct_peers: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            bridge: BridgeConfig {
                reject_pending_on_uncaught_exception: true,
                call_and_log_timeout_ms: Some(30_000),
            },
            chain: Chain::evm(1),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            call_timeout_ms: 10_000,
            direct_peers: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}
