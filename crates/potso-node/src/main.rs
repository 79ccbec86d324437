//! Thin composition-root binary: loads policy configuration, opens the
//! storage backend, and boots a `PotsoNode`.
//!
//! The JSON-RPC server, P2P transport, and CLI surface that would normally
//! drive this node from the outside are explicitly out of scope (spec §1) —
//! this binary exists only to prove the wiring, the way the teacher's own
//! `examples/` binaries exercise one crate's construction path rather than
//! standing in for its full product surface.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use potso_node::{init_logging, NodeConfig, PotsoNode, TracingEventSink};
use potso_storage::{KvStore, MemoryKvStore, SledKvStore};
use tracing::info;

#[derive(Parser)]
#[command(name = "potso-node")]
#[command(about = "POTSO BFT consensus core: boots the weight ledger, penalty engine, evidence store, and reward ledger")]
struct Cli {
    /// Path to a TOML policy file; falls back to a conservative built-in
    /// default (see `potso_node::config::NodeConfig::default`) when absent.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the sled-backed KV store; uses an in-memory store when
    /// absent (suitable for a dry run or embedding in tests).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Emit debug-level logs.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => NodeConfig::from_file(path).with_context(|| format!("loading config from {}", path.display()))?,
        None => NodeConfig::default(),
    };
    info!(
        floor = config.weight_bounds.floor,
        ceiling = config.weight_bounds.ceiling,
        slash_enabled = config.penalties.slash_enabled,
        "policy loaded"
    );

    let kv: Arc<dyn KvStore> = match &cli.data_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "opening sled-backed evidence/reward store");
            Arc::new(SledKvStore::open(dir).context("opening sled store")?)
        }
        None => {
            info!("no --data-dir given, using an in-memory evidence/reward store");
            Arc::new(MemoryKvStore::new())
        }
    };

    let node = PotsoNode::new(config, kv, Arc::new(TracingEventSink)).context("assembling POTSO node")?;
    info!(validators = node.weight_snapshot().len(), "POTSO core assembled");

    // No P2P transport or RPC server is wired up here (spec §1 non-goals);
    // an embedding binary drives `PotsoNode`/`BftEngine` from its own
    // network and storage layers.
    Ok(())
}
