//! Subcommand implementations.

pub mod init;
pub mod run;
pub mod settings;

use eyre::{eyre, WrapErr};
use rbtc_chainspec::{ChainSpec, DEV, MAINNET};
use std::path::{Path, PathBuf};

/// Resolves a `--chain` value: a built-in name or a spec file path.
pub(crate) fn chain_spec(value: &str) -> eyre::Result<ChainSpec> {
    match value {
        "mainnet" => Ok(MAINNET.clone()),
        "dev" => Ok(DEV.clone()),
        path => {
            let raw = std::fs::read_to_string(Path::new(path))
                .wrap_err_with(|| eyre!("unknown chain {path}, and not a readable spec file"))?;
            serde_json::from_str(&raw).wrap_err("malformed chain spec file")
        }
    }
}

/// The file recording which chain a data directory serves.
pub(crate) fn genesis_marker(datadir: &Path) -> PathBuf {
    datadir.join("genesis.json")
}

/// Loads the chain identity recorded in a data directory.
pub(crate) fn recorded_spec(marker: &Path) -> eyre::Result<ChainSpec> {
    let raw = std::fs::read_to_string(marker)
        .wrap_err_with(|| eyre!("unreadable chain record {}", marker.display()))?;
    serde_json::from_str(&raw).wrap_err("malformed chain record")
}
