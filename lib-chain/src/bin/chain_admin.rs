//! Chain administration CLI
//!
//! Operator entry point over the chain core: initialise storage from the
//! genesis block, inspect the head, pop the last block, truncate storage.
//! Exits with status 1 when the core reports a ledger consistency fault.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use lib_chain::{
    BlockId, BlockStore, Chain, ChainComponents, ChainConfig, ChainError, MemoryLedger,
    SqliteStore,
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(name = "chain-admin")]
struct ChainAdminCli {
    /// Configuration file path
    #[arg(short, long, default_value = "chain.toml", env = "CHAIN_CONFIG")]
    config: PathBuf,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: ChainCommand,
}

#[derive(Subcommand, Debug, Clone)]
enum ChainCommand {
    /// Persist and apply the genesis block
    Init,

    /// Show the persisted chain head
    Status,

    /// Roll back the last block
    Pop,

    /// Delete every persisted block from the given block upward
    Truncate {
        /// First block to delete
        #[arg(long)]
        after: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ChainAdminCli::parse();

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ChainConfig::load(&cli.config).await?;
    let genesis = config.load_genesis().await?;
    let store = Arc::new(
        SqliteStore::connect(&config.database)
            .await
            .context("Failed to open chain store")?,
    );
    let ledger = Arc::new(MemoryLedger::new(genesis.id.clone()));
    let chain = Chain::new(
        ChainComponents::with_ledger(store.clone(), ledger, genesis),
        &config.apply,
    );

    let outcome = run(cli.command, &chain, store.as_ref()).await;

    if let Some(reason) = chain.shutdown().reason() {
        error!("Chain core halted: {}", reason);
        store.close().await;
        std::process::exit(1);
    }
    store.close().await;
    outcome
}

async fn run(command: ChainCommand, chain: &Chain, store: &SqliteStore) -> Result<()> {
    match command {
        ChainCommand::Init => {
            chain.save_genesis_block().await?;
            chain.apply_genesis_block(chain.genesis().clone()).await?;
            info!("Chain initialised at genesis {}", chain.genesis().id);
            print_status(chain, store).await
        }
        ChainCommand::Status => {
            chain.restore_head().await?;
            print_status(chain, store).await
        }
        ChainCommand::Pop => {
            replay(chain, store).await?;
            let head = chain.delete_last_block().await?;
            println!("new head: {} (height {})", head.id, head.height);
            Ok(())
        }
        ChainCommand::Truncate { after } => {
            let response = chain.delete_after_block(&BlockId::new(after)).await?;
            println!("deleted blocks: {}", response.rows_affected);
            Ok(())
        }
    }
}

/// Rebuild in-memory account state by applying genesis and every persisted
/// block after it, oldest first.
async fn replay(chain: &Chain, store: &SqliteStore) -> Result<()> {
    let mut blocks = Vec::new();
    let mut cursor = store.load_last_block().await?;
    while let Some(block) = cursor {
        if block.is_genesis() {
            break;
        }
        let parent = match &block.previous_block {
            Some(parent_id) => store.load_block(parent_id).await?,
            None => None,
        };
        blocks.push(block);
        cursor = parent;
    }

    chain.apply_genesis_block(chain.genesis().clone()).await?;
    for block in blocks.into_iter().rev() {
        match chain.apply_block(block, false).await {
            Ok(()) => {}
            Err(ChainError::BlockApplication { block_id, faults, .. }) => {
                error!("Replayed block {} with {} fault(s)", block_id, faults.len());
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

async fn print_status(chain: &Chain, store: &SqliteStore) -> Result<()> {
    let count = store.count_blocks().await?;
    match chain.head() {
        Some(head) => println!("head: {} (height {}), persisted blocks: {}", head.id, head.height, count),
        None => println!("head: none, persisted blocks: {}", count),
    }
    Ok(())
}
