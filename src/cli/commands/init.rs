//! Init command implementation.

use crate::cli::{init_tracing, GlobalOptions};
use crate::provision::{open_secrets, resolve_server_key, template, SecretsProvider};
use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

/// Create the storage directory, server key and server config.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Server config output path (default: `<storage_dir>/peers.conf`).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite an existing server config.
    #[arg(long)]
    pub force: bool,
}

/// Run the init command.
pub fn run_init(args: InitArgs, opts: &GlobalOptions) -> Result<()> {
    let config = opts.load_config()?;
    init_tracing(&config.telemetry.log_level);

    let storage_dir = Path::new(&config.paths.storage_dir);
    std::fs::create_dir_all(storage_dir)
        .with_context(|| format!("failed to create storage directory: {:?}", storage_dir))?;
    println!("Initialized data directory: {:?}", storage_dir);

    let secrets = open_secrets(&config)?;
    let server_key = resolve_server_key(
        &config,
        secrets.as_ref().map(|s| s as &dyn SecretsProvider),
    )?;
    if server_key.generated {
        println!("Generated server key: {}", config.provisioning.server_key_path);
    }
    println!("Server public key: {}", server_key.keys.public);

    let output = args
        .output
        .unwrap_or_else(|| storage_dir.join("peers.conf"));
    if output.exists() && !args.force && !server_key.generated {
        println!("Server config present: {:?}", output);
        return Ok(());
    }

    // The address below the first usable one belongs to the server.
    let space = config.address_space()?;
    let server_address = space
        .base()
        .successor()
        .context("pool block has no room for a server address")?;
    let interface = template::render_server_interface(
        &server_key.keys.private,
        server_address,
        space.prefix_len(),
        config.provisioning.listen_port,
    );
    std::fs::write(&output, interface)
        .with_context(|| format!("failed to write server config: {:?}", output))?;
    println!("Wrote server config: {:?}", output);

    Ok(())
}
