//! Start command implementation.

use crate::cli::{init_tracing, GlobalOptions};
use crate::core::runtime::PoolRuntime;
use anyhow::Result;
use clap::Args;

/// Run the pool until shutdown.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Skip seeding even if `pool.seed_on_start` is set.
    #[arg(long)]
    pub no_seed: bool,
}

/// Run the start command.
pub async fn run_start(args: StartArgs, opts: &GlobalOptions) -> Result<()> {
    let mut config = opts.load_config()?;
    init_tracing(&config.telemetry.log_level);

    if args.no_seed {
        config.pool.seed_on_start = false;
    }

    let mut runtime = PoolRuntime::start(config).await?;
    runtime.run().await
}
