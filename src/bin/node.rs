//! chainmesh node CLI application

use anyhow::Context;
use chainmesh::{Node, NodeConfig};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "chainmesh-node")]
#[command(about = "A minimal peer-to-peer proof-of-work ledger node")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Port to listen on
    #[arg(short, long, default_value_t = chainmesh::DEFAULT_PORT)]
    port: u16,

    /// Dialable address advertised to peers
    #[arg(short, long)]
    addr: Option<String>,

    /// Seed node to bootstrap against
    #[arg(short, long)]
    bootstrap: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a chainmesh node
    Start,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Some(Commands::Start) | None => {
            let config = NodeConfig {
                port: cli.port,
                advertised_addr: cli.addr,
                bootstrap: cli.bootstrap,
                ..NodeConfig::default()
            };

            let mut node = Node::new(config);
            let addr = node.start().await.context("failed to start node")?;
            info!(%addr, "node started");

            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl-c");

            info!("Shutting down node...");
            node.stop().await.context("failed to stop node")?;
        },
        Some(Commands::Version) => {
            println!("chainmesh v{}", chainmesh::VERSION);
        },
    }

    Ok(())
}
