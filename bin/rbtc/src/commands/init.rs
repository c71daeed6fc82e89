//! `rbtc initchain` command.

use clap::Parser;
use eyre::{bail, WrapErr};
use std::path::PathBuf;
use tracing::info;

/// Initialize a data directory with a chain's genesis identity.
#[derive(Debug, Parser)]
pub struct Command {
    /// The chain to initialize: `mainnet`, `dev`, or a spec file path.
    #[arg(long, default_value = "mainnet")]
    chain: String,

    /// The data directory recording the chain identity.
    #[arg(long, default_value = "rbtc-data")]
    datadir: PathBuf,
}

impl Command {
    /// Execute the command.
    pub fn execute(self) -> eyre::Result<()> {
        let spec = super::chain_spec(&self.chain)?;
        let marker = super::genesis_marker(&self.datadir);
        if marker.exists() {
            let recorded = super::recorded_spec(&marker)?;
            if recorded.genesis_hash() == spec.genesis_hash() {
                bail!(
                    "data dir {} is already initialized for {}",
                    self.datadir.display(),
                    recorded.name
                );
            }
            bail!(
                "data dir {} is initialized for {}, refusing to overwrite with {}",
                self.datadir.display(),
                recorded.name,
                spec.name
            );
        }

        std::fs::create_dir_all(&self.datadir)
            .wrap_err_with(|| format!("cannot create data dir {}", self.datadir.display()))?;
        std::fs::write(&marker, serde_json::to_string_pretty(&spec)?)
            .wrap_err_with(|| format!("cannot record chain identity {}", marker.display()))?;

        info!(
            chain = %spec.name,
            genesis = %spec.genesis_hash(),
            datadir = %self.datadir.display(),
            "chain initialized"
        );
        Ok(())
    }
}
