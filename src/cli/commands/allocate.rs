//! Allocate command implementation.

use crate::cli::{init_tracing, GlobalOptions};
use crate::core::runtime::PoolRuntime;
use crate::provision::{allocate_with_retry, RetryPolicy};
use anyhow::Result;
use clap::Args;

/// Allocate one address.
#[derive(Args, Debug)]
pub struct AllocateArgs {
    /// Owner identifier recorded against the address.
    #[arg(long)]
    pub owner: String,
}

/// Run the allocate command.
pub async fn run_allocate(args: AllocateArgs, opts: &GlobalOptions) -> Result<()> {
    let config = opts.load_config()?;
    init_tracing(&config.telemetry.log_level);

    let policy = RetryPolicy::from_config(&config);
    let mut runtime = PoolRuntime::start(config).await?;
    let result = allocate_with_retry(
        runtime.coordinator(),
        &args.owner,
        &runtime.op_context(),
        policy,
    )
    .await;
    runtime.shutdown().await?;

    let address = result?;
    println!("{}", address);
    Ok(())
}
