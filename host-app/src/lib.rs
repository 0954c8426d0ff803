//! Wallet host application library.

mod broadcaster;
mod config;
mod platform;
mod session;
mod worker;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use config::{AppConfig, Platform, DEFAULT_LOG_FILTER};
pub use platform::{connect, HostSession};
pub use session::{run_host, SessionReport};
pub use worker::{register_services, run_stdio_worker, PingParams};

/// Initialize logging. `RUST_LOG` wins over `default_filter`.
///
/// Output goes to stderr: in worker mode stdout carries the bridge protocol.
pub fn init_logging(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
