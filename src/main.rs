//! Wireable - unified CLI entrypoint.
//!
//! Usage:
//!   wireable start --config config/wireable.toml
//!   wireable init
//!   wireable seed [--limit N]
//!   wireable allocate --owner <ID>
//!   wireable release <ADDRESS>
//!   wireable status [--format json]
//!   wireable provision [--output client.conf]
//!   wireable config validate|show|generate

use anyhow::Result;
use clap::Parser;
use wireable::cli::commands::{
    run_allocate, run_config, run_init, run_provision, run_release, run_seed, run_start,
    run_status,
};
use wireable::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let opts = cli.global_options();

    match cli.command {
        Commands::Start(args) => run_start(args, &opts).await,
        Commands::Init(args) => run_init(args, &opts),
        Commands::Seed(args) => run_seed(args, &opts).await,
        Commands::Allocate(args) => run_allocate(args, &opts).await,
        Commands::Release(args) => run_release(args, &opts).await,
        Commands::Status(args) => run_status(args, &opts).await,
        Commands::Provision(args) => run_provision(args, &opts).await,
        Commands::Config(args) => run_config(args, &opts),
    }
}
