//! emberd — entry point for running an ember node.

use clap::Parser;

use ember_node::{Node, NodeConfig};

#[derive(Parser)]
#[command(name = "emberd", about = "ember blockchain node daemon")]
struct Cli {
    /// Node name, tagged onto every log line.
    #[arg(long)]
    name: String,

    /// Path to the TOML configuration file.
    #[arg(long)]
    config: String,

    /// Host for the peer-to-peer WebSocket endpoint.
    #[arg(long)]
    websocket_host: String,

    /// Port for the peer-to-peer WebSocket endpoint.
    #[arg(long)]
    websocket_port: u16,

    /// Host for the HTTP API.
    #[arg(long)]
    http_host: String,

    /// Port for the HTTP API.
    #[arg(long)]
    http_port: u16,

    /// Verbose log output (debug level).
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    ember_node::init_logging(cli.verbose);

    let chain = NodeConfig::load_chain_params(&cli.config)?;
    tracing::info!(
        pow = chain.pow_enabled(),
        transactions = chain.transactions_enabled(),
        "configuration loaded"
    );

    let config = NodeConfig {
        name: cli.name,
        websocket_host: cli.websocket_host,
        websocket_port: cli.websocket_port,
        http_host: cli.http_host,
        http_port: cli.http_port,
        chain,
    };

    let node = Node::start(config).await?;
    node.wait_for_signal().await;

    tracing::info!("shutdown signal received, stopping node");
    node.stop().await;
    tracing::info!("emberd exited cleanly");

    Ok(())
}
