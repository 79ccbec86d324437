//! Composition root for the POTSO consensus core: wires the Weight Ledger
//! (`potso-weights`), Penalty Engine (`potso-weights`), Evidence pipeline
//! (`potso-evidence`), BFT Engine (`potso-consensus`), and Reward
//! Distributor (`potso-rewards`) behind one configuration surface and one
//! event sink (spec §2, §6).
//!
//! Everything this crate excludes — the JSON-RPC server, the P2P transport,
//! the key-value storage engine's on-disk format, the CLI, and the
//! unrelated native modules (lending, swap, creator economy, fees, POS
//! registry, escrow, loyalty) — is out of scope per spec §1 and lives, if
//! anywhere, outside this workspace.

pub mod config;
pub mod error;
pub mod events;
pub mod node;

pub use config::NodeConfig;
pub use error::NodeError;
pub use events::{NoopEventSink, PotsoEventSink, RewardsPaidEvent, RewardsReadyEvent, TracingEventSink};
pub use node::PotsoNode;

/// Initializes a `tracing` subscriber at the given level, the same shape the
/// teacher's CLI entry point sets up (`tracing_subscriber::registry()` +
/// `fmt::layer()` + a `LevelFilter`), extracted here so both `main.rs` and
/// embedding binaries can call it without duplicating the setup.
pub fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).with_thread_ids(false))
        .with(tracing_subscriber::filter::LevelFilter::from_level(level))
        .try_init();
}
