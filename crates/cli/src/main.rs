//! seqarchive - instrument drive backup and NGS run archival
//!
//! Main binary entry point for the command-line interface.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Backup(args) => cli::backup::run(args, config, cli.verbose),
        Commands::Archive(args) => cli::archive::run(args, config, cli.verbose),
    }
}
