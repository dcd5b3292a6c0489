#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use emberchain::config::load_config;
use emberchain::crypto::Account;
use emberchain::error::Result;
use emberchain::genesis::Genesis;
use emberchain::ledger;
use emberchain::node::Node;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

const NODE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "emberchain-node", version, about = "Emberchain blockchain node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the node: HTTP API, peer sync, and (optionally) mining
    Run {
        /// Path to the TOML config file
        #[arg(long, default_value = "emberchain.toml")]
        config: PathBuf,
    },
    /// Initialize a data directory with a genesis file and empty block log
    Init {
        /// Data directory to create
        #[arg(long)]
        datadir: PathBuf,
        /// Account credited with the genesis balance
        #[arg(long)]
        genesis_account: Account,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run { config } => run(config).await,
        Command::Init {
            datadir,
            genesis_account,
        } => init(datadir, genesis_account),
    };

    if let Err(err) = result {
        error!(%err, "Node exited with error");
        std::process::exit(1);
    }
}

async fn run(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)?;
    let node = Arc::new(Node::new(&config, NODE_VERSION)?);

    let shutdown_node = Arc::clone(&node);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, shutting down");
            shutdown_node.shutdown();
        }
    });

    node.run().await
}

fn init(datadir: PathBuf, genesis_account: Account) -> Result<()> {
    ledger::init_data_dir(&datadir, &Genesis::default_devnet(genesis_account))?;
    info!(datadir = %datadir.display(), account = %genesis_account, "Initialized data dir");
    Ok(())
}
