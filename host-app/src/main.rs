//! Wallet host entry point.
//!
//! `host` starts a worker for the selected platform and runs a session
//! against it; `worker` serves the bridge over stdin/stdout and is what the
//! mobile platform spawns.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use wallet_bridge_lib::{init_logging, run_host, run_stdio_worker, AppConfig, Platform};

#[derive(Parser)]
#[command(name = "wallet-bridge")]
#[command(version)]
#[command(about = "Wallet host bridged to a worker runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a worker and run a host session against it
    Host {
        /// Where the worker runs; overrides the config file
        #[arg(long, value_enum)]
        platform: Option<Platform>,

        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Serve the bridge over stdin/stdout
    Worker,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Host { platform, config } => {
            let mut config = match config {
                Some(path) => AppConfig::load(&path)?,
                None => AppConfig::default(),
            };
            if let Some(platform) = platform {
                config.platform = platform;
            }

            init_logging(&config.log_filter);
            info!(platform = %config.platform, "Wallet host starting");

            let report = run_host(&config).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Worker => {
            init_logging(wallet_bridge_lib::DEFAULT_LOG_FILTER);
            run_stdio_worker().await?;
        }
    }

    Ok(())
}
