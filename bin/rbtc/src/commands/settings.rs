//! `rbtc settings` command.

use clap::Parser;
use rbtc_chainspec::NodeConfig;
use serde_json::json;

/// Print the effective settings as JSON.
#[derive(Debug, Parser)]
pub struct Command {
    /// The chain the settings apply to.
    #[arg(long, default_value = "mainnet")]
    chain: String,
}

impl Command {
    /// Execute the command.
    pub fn execute(self) -> eyre::Result<()> {
        let spec = super::chain_spec(&self.chain)?;
        let settings = json!({
            "chain": spec,
            "node": NodeConfig::default(),
        });
        println!("{}", serde_json::to_string_pretty(&settings)?);
        Ok(())
    }
}
