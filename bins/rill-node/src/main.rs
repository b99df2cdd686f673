//! Rill full node binary: opens the chain for `NODE_ID`, optionally mines,
//! and serves the command-framed TCP protocol until ctrl-c.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use rill_chain::Chain;
use rill_core::address::Address;
use rill_network::NodeState;
use tracing::{error, info};

/// Rill full node.
#[derive(Parser, Debug)]
#[command(name = "rill-node", version, about = "Rill full node")]
struct Args {
    /// Root directory holding `blocks_<NODE_ID>/` chain databases.
    #[arg(long, default_value = "./tmp")]
    blocks_root: PathBuf,

    /// Address to mine block rewards to; if absent, this node never mines.
    #[arg(long)]
    miner: Option<String>,

    /// Bootstrap peer address (`host:port`) to greet on startup.
    #[arg(long)]
    bootstrap: Option<String>,

    /// This node IS the bootstrap: it rebroadcasts transactions to every
    /// known peer instead of mining them directly.
    #[arg(long)]
    is_bootstrap: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args.log_level);

    let node_id = match std::env::var("NODE_ID") {
        Ok(id) => id,
        Err(_) => {
            error!("NODE_ID environment variable is required");
            process::exit(1);
        }
    };
    let node_address = format!("0.0.0.0:{node_id}");

    let miner_address = match &args.miner {
        Some(addr) => match Address::decode(addr) {
            Ok(a) => Some(a.pub_key_hash()),
            Err(e) => {
                error!(address = %addr, error = %e, "invalid miner address");
                process::exit(1);
            }
        },
        None => None,
    };

    let chain_path = args.blocks_root.join(format!("blocks_{node_id}"));
    let chain = match Chain::continue_existing(&chain_path) {
        Ok(chain) => chain,
        Err(e) => {
            error!(error = %e, path = %chain_path.display(), "no chain found; run `rill-cli createchain` first");
            process::exit(1);
        }
    };

    info!(height = chain.get_best_height().unwrap_or(0), "chain loaded");

    let state = NodeState::new(
        node_address,
        args.is_bootstrap,
        args.bootstrap,
        miner_address,
        rill_core::pow::DEFAULT_DIFFICULTY,
        chain,
    );

    if let Err(e) = state.run().await {
        error!(error = %e, "node loop exited with an error");
        process::exit(1);
    }
    info!("shutdown complete");
}

fn init_logging(level_str: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();
}
