//! `rbtc node run` command.

use clap::Parser;
use eyre::bail;
use rbtc_chainspec::NodeConfig;
use rbtc_network_api::NoopNetwork;
use rbtc_node::{FullNode, NodeError};
use rbtc_storage_api::MemoryStore;
use std::{path::PathBuf, sync::Arc};
use tracing::info;

/// Run the node.
#[derive(Debug, Parser)]
pub struct Command {
    /// The chain to run: `mainnet`, `dev`, or a spec file path.
    #[arg(long, default_value = "mainnet")]
    chain: String,

    /// The data directory recording the chain identity.
    #[arg(long, default_value = "rbtc-data")]
    datadir: PathBuf,

    /// Organize whole blocks instead of headers first.
    #[arg(long)]
    blocks_first: bool,

    /// Currency window in minutes; zero disables the check.
    #[arg(long, default_value_t = 60)]
    currency_window_minutes: u32,

    /// Blocks between automatic snapshots; zero disables them.
    #[arg(long, default_value_t = 0)]
    snapshot_interval: u64,
}

impl Command {
    /// Execute the command, blocking until interrupted.
    pub fn execute(self) -> eyre::Result<()> {
        let spec = super::chain_spec(&self.chain)?;
        let config = NodeConfig {
            headers_first: !self.blocks_first,
            currency_window_minutes: self.currency_window_minutes,
            snapshot_interval_blocks: self.snapshot_interval,
            ..Default::default()
        };

        // The durable archive is a separate component; the data directory
        // records the chain identity and the in-memory store seeds from it.
        // Without that record the store stays uninitialized and the
        // supervisor refuses to start.
        let marker = super::genesis_marker(&self.datadir);
        let store = if marker.exists() {
            let recorded = super::recorded_spec(&marker)?;
            if recorded.genesis_hash() != spec.genesis_hash() {
                bail!(
                    "data dir {} is initialized for {}, not {}",
                    self.datadir.display(),
                    recorded.name,
                    spec.name
                );
            }
            Arc::new(MemoryStore::with_genesis(&spec))
        } else {
            Arc::new(MemoryStore::new())
        };

        let datadir = self.datadir;
        let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
        runtime.block_on(async move {
            let mut node = FullNode::new(store, NoopNetwork, spec, config);
            node.start().map_err(|error| match error {
                NodeError::StoreUninitialized => eyre::eyre!(
                    "{error}: run `rbtc initchain --datadir {}` first",
                    datadir.display()
                ),
                other => eyre::Report::new(other),
            })?;
            node.run().await?;
            info!("node running, press ctrl-c to stop");

            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            node.close().await?;
            Ok(())
        })
    }
}
