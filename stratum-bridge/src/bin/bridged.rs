//! Main entry point for the stratum-bridge daemon.

use clap::Parser;
use stratum_bridge::{config::BridgeConfig, daemon::Daemon, tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BridgeConfig::parse();
    tracing::init_journald_or_stdout();

    Daemon::new(config).run().await
}
