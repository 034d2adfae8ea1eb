use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod utils;

#[derive(Parser)]
#[command(name = "namedex-cmd")]
#[command(about = "Builds and queries the feature-name index of a genome browser data directory")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or incrementally extend) the name index
    Generate(commands::generate::GenerateArgs),

    /// Print every location recorded for a name
    Lookup {
        /// Browser data directory
        #[arg(long, default_value = "data")]
        out: PathBuf,

        /// Feature name, case-insensitive
        name: String,
    },

    /// Print the completions stored for a prefix
    Complete {
        /// Browser data directory
        #[arg(long, default_value = "data")]
        out: PathBuf,

        /// Name prefix, case-insensitive
        prefix: String,
    },

    /// Display summary information about an index
    Inspect {
        /// Browser data directory
        #[arg(long, default_value = "data")]
        out: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Generate(args) => commands::generate::run(args),
        Commands::Lookup { out, name } => commands::lookup::run_lookup(out, name),
        Commands::Complete { out, prefix } => commands::lookup::run_complete(out, prefix),
        Commands::Inspect { out } => commands::inspect::run(out),
    }
}
