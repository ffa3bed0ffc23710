//! Release command implementation.

use crate::cli::{init_tracing, GlobalOptions};
use crate::core::runtime::open_store;
use crate::pool::{Address, AllocationCoordinator, AvailabilityHeap, OpContext};
use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;

/// Release an address.
#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// Address to release.
    pub address: String,
}

/// Run the release command.
pub async fn run_release(args: ReleaseArgs, opts: &GlobalOptions) -> Result<()> {
    let config = opts.load_config()?;
    init_tracing(&config.telemetry.log_level);

    let address: Address = args
        .address
        .parse()
        .with_context(|| format!("invalid address: {}", args.address))?;
    let space = config.address_space()?;
    if !space.contains(&address) {
        anyhow::bail!("{} is outside the pool block {}", address, space);
    }

    // Release never reads the heap.
    let store = open_store(&config).await?;
    let coordinator = AllocationCoordinator::new(
        store.clone(),
        Arc::new(AvailabilityHeap::new()),
        config.pool_keys(),
    );
    coordinator
        .release(address, &OpContext::with_timeout(config.request_timeout()))
        .await?;
    store.flush().await.context("failed to flush store")?;

    println!("Released {}", address);
    Ok(())
}
