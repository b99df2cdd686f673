//! rill-cli — command-line interface for chain and wallet operations.
//!
//! Everything here keys off `NODE_ID`, which selects the chain database at
//! `<blocks_root>/blocks_<NODE_ID>/` and the wallet file at
//! `<wallets_root>/wallets_<NODE_ID>.data`. Starting the long-running
//! listener is `rill-node`'s job, not this binary's.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpStream;

use rill_chain::{Chain, UtxoSet};
use rill_core::address::Address;
use rill_core::pow::DEFAULT_DIFFICULTY;
use rill_network::protocol::{write_message, Message, TxPayload};
use rill_wallet::{wallet_path, WalletStore};

/// Rill command-line wallet and chain interface.
#[derive(Parser)]
#[command(name = "rill-cli")]
#[command(version, about = "Rill chain and wallet CLI")]
struct Cli {
    #[arg(long, default_value = "./tmp")]
    blocks_root: PathBuf,

    #[arg(long, default_value = "./tmp")]
    wallets_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new chain, paying the genesis reward to `address`.
    CreateChain {
        #[arg(long)]
        address: String,
    },
    /// Sum of every unspent output locked to `address`.
    Balance {
        #[arg(long)]
        address: String,
    },
    /// Build, sign, and publish a transfer to a bootstrap node.
    Send {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
        #[arg(long)]
        bootstrap: String,
    },
    /// Print every block's hash, PoW validity, and transactions.
    Print,
    /// Rebuild the UTXO index and print how many transactions it covers.
    ReindexUtxo,
    /// Generate a new wallet and print its address.
    CreateWallet,
    /// List every address in the wallet file.
    ListAddresses,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let node_id = std::env::var("NODE_ID").context("NODE_ID environment variable is required")?;

    match cli.command {
        Commands::CreateChain { address } => create_chain(&cli.blocks_root, &node_id, &address),
        Commands::Balance { address } => balance(&cli.blocks_root, &node_id, &address),
        Commands::Send { from, to, amount, bootstrap } => {
            send(&cli.blocks_root, &cli.wallets_root, &node_id, &from, &to, amount, &bootstrap).await
        }
        Commands::Print => print_chain(&cli.blocks_root, &node_id),
        Commands::ReindexUtxo => reindex_utxo(&cli.blocks_root, &node_id),
        Commands::CreateWallet => create_wallet(&cli.wallets_root, &node_id),
        Commands::ListAddresses => list_addresses(&cli.wallets_root, &node_id),
    }
}

fn chain_path(blocks_root: &PathBuf, node_id: &str) -> PathBuf {
    blocks_root.join(format!("blocks_{node_id}"))
}

/// Initialize a new chain, paying the genesis reward to `address`.
fn create_chain(blocks_root: &PathBuf, node_id: &str, address: &str) -> Result<()> {
    let addr = Address::decode(address).context("invalid address")?;
    let chain = Chain::init(chain_path(blocks_root, node_id), addr, DEFAULT_DIFFICULTY)
        .context("chain already exists or could not be created")?;
    UtxoSet::for_chain(&chain).reindex(&chain)?;
    println!("chain created, genesis hash {}", chain.last_hash());
    Ok(())
}

fn balance(blocks_root: &PathBuf, node_id: &str, address: &str) -> Result<()> {
    let addr = Address::decode(address).context("invalid address")?;
    let chain = Chain::continue_existing(chain_path(blocks_root, node_id))
        .context("no chain found; run createchain first")?;
    let balance = UtxoSet::for_chain(&chain).balance(&addr.pub_key_hash())?;
    println!("balance of {address}: {balance}");
    Ok(())
}

fn print_chain(blocks_root: &PathBuf, node_id: &str) -> Result<()> {
    let chain = Chain::continue_existing(chain_path(blocks_root, node_id))
        .context("no chain found; run createchain first")?;
    for block in chain.iter() {
        let block = block?;
        println!("hash: {}", block.hash);
        println!("prev_hash: {}", block.prev_hash);
        println!("height: {}", block.height);
        println!("pow valid: {}", block.validate_pow(DEFAULT_DIFFICULTY));
        for tx in &block.transactions {
            println!("  tx {} ({} in, {} out)", tx.id, tx.inputs.len(), tx.outputs.len());
        }
        println!();
    }
    Ok(())
}

fn reindex_utxo(blocks_root: &PathBuf, node_id: &str) -> Result<()> {
    let chain = Chain::continue_existing(chain_path(blocks_root, node_id))
        .context("no chain found; run createchain first")?;
    let utxo = UtxoSet::for_chain(&chain);
    utxo.reindex(&chain)?;
    println!("done! there are {} transactions in the UTXO set", utxo.count_transactions()?);
    Ok(())
}

fn create_wallet(wallets_root: &PathBuf, node_id: &str) -> Result<()> {
    let path = wallet_path(wallets_root, node_id);
    let mut store = WalletStore::load_or_create(&path)?;
    let address = store.add_wallet();
    store.save()?;
    println!("new address: {address}");
    Ok(())
}

fn list_addresses(wallets_root: &PathBuf, node_id: &str) -> Result<()> {
    let store = WalletStore::load_or_create(wallet_path(wallets_root, node_id))?;
    for address in store.addresses() {
        println!("{address}");
    }
    Ok(())
}

/// Build a transaction spending `from`'s UTXOs, sign it, and publish it to
/// `bootstrap` as a `tx` message. The bootstrap node rebroadcasts it or
/// mines it directly, per the gossip protocol's step 9.
async fn send(
    blocks_root: &PathBuf,
    wallets_root: &PathBuf,
    node_id: &str,
    from: &str,
    to: &str,
    amount: u64,
    bootstrap: &str,
) -> Result<()> {
    let to_addr = Address::decode(to).context("invalid recipient address")?;

    let wallets = WalletStore::load_or_create(wallet_path(wallets_root, node_id))?;
    let wallet = wallets.get(from)?;

    let chain = Chain::continue_existing(chain_path(blocks_root, node_id))
        .context("no chain found; run createchain first")?;
    let utxo = UtxoSet::for_chain(&chain);

    let tx = utxo.new_transaction(wallet.key_pair(), &wallet.pub_key_hash(), to_addr.pub_key_hash(), amount)?;

    let mut stream = TcpStream::connect(bootstrap)
        .await
        .with_context(|| format!("could not reach bootstrap node at {bootstrap}"))?;
    let message = Message::Tx(TxPayload {
        from_addr: format!("0.0.0.0:{node_id}"),
        tx_bytes: rill_core::codec::encode(&tx)?,
    });
    write_message(&mut stream, &message).await?;
    println!("sent: {} -> {to} ({amount})", tx.id);
    Ok(())
}
