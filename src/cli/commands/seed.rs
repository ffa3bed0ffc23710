//! Seed command implementation.

use crate::cli::{init_tracing, GlobalOptions};
use crate::core::runtime::open_store;
use crate::pool::{seed_pool, OpContext};
use anyhow::{Context, Result};
use clap::Args;

/// Seed the store with the configured block.
#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Override `pool.max_seed_addresses`.
    #[arg(long)]
    pub limit: Option<u64>,
}

/// Run the seed command.
pub async fn run_seed(args: SeedArgs, opts: &GlobalOptions) -> Result<()> {
    let config = opts.load_config()?;
    init_tracing(&config.telemetry.log_level);

    let space = config.address_space()?;
    let store = open_store(&config).await?;
    let ctx = OpContext::with_timeout(config.request_timeout());
    let limit = args.limit.unwrap_or(config.pool.max_seed_addresses);

    let report = seed_pool(store.as_ref(), &space, &config.pool_keys(), limit, &ctx)
        .await
        .context("seeding failed")?;
    store.flush().await.context("failed to flush store")?;

    println!("Seeded {}", space);
    println!("  Created:  {}", report.created);
    println!("  Skipped:  {}", report.skipped);
    Ok(())
}
