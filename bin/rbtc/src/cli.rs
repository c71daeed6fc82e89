//! CLI definition and entrypoint to executable.

use crate::commands::{init, run as run_cmd, settings};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Parse CLI options, install the tracing subscriber and run the command.
pub fn run() -> eyre::Result<()> {
    let cli = Cli::parse();
    cli.init_tracing();

    match cli.command {
        Commands::Init(command) => command.execute(),
        Commands::Run(command) => command.execute(),
        Commands::Settings(command) => command.execute(),
    }
}

/// rbtc: a Bitcoin chain organizer.
#[derive(Debug, Parser)]
#[command(author, version, about = "rbtc", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Use verbose output (-v, -vv for maximum).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbosity: u8,
}

impl Cli {
    fn init_tracing(&self) {
        let default = match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Commands to be executed.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Initialize a data directory with a chain's genesis identity.
    #[command(name = "initchain")]
    Init(init::Command),
    /// Run the node.
    Run(run_cmd::Command),
    /// Print the effective settings as JSON.
    Settings(settings::Command),
}
