//! Status command implementation.

use crate::cli::{init_tracing, GlobalOptions};
use crate::core::runtime::open_store;
use crate::ops::observability::PoolMetrics;
use crate::pool::{AllocationCoordinator, AvailabilityHeap, OpContext};
use anyhow::Result;
use clap::Args;
use std::sync::Arc;

/// Show pool usage.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output format (text, json, prometheus).
    #[arg(long, default_value = "text")]
    pub format: String,
}

/// Run the status command.
pub async fn run_status(args: StatusArgs, opts: &GlobalOptions) -> Result<()> {
    let config = opts.load_config()?;
    init_tracing(&config.telemetry.log_level);

    let space = config.address_space()?;
    let store = open_store(&config).await?;
    let coordinator = AllocationCoordinator::new(
        store.clone(),
        Arc::new(AvailabilityHeap::new()),
        config.pool_keys(),
    );
    let usage = coordinator
        .usage(&OpContext::with_timeout(config.request_timeout()))
        .await?;
    let unseeded = space
        .usable_count()
        .saturating_sub((usage.available + usage.taken) as u128);

    match args.format.as_str() {
        "json" => {
            let status = serde_json::json!({
                "cidr": space.to_string(),
                "namespace": config.pool.namespace,
                "store": store.name(),
                "usable": space.usable_count().to_string(),
                "available": usage.available,
                "taken": usage.taken,
                "unseeded": unseeded.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        "prometheus" => {
            let metrics = PoolMetrics::new();
            metrics.set_store_usage(usage.available, usage.taken);
            print!("{}", metrics.export());
        }
        _ => {
            println!("Wireable Pool Status");
            println!("====================");
            println!("Block:        {}", space);
            println!("Namespace:    {}", config.pool.namespace);
            println!("Store:        {}", store.name());
            println!();
            println!("Addresses:");
            println!("  Usable:     {}", space.usable_count());
            println!("  Available:  {}", usage.available);
            println!("  Taken:      {}", usage.taken);
            if unseeded > 0 {
                println!("  Unseeded:   {}", unseeded);
            }
        }
    }
    Ok(())
}
