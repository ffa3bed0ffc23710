//! Provision command implementation.

use crate::cli::{init_tracing, GlobalOptions};
use crate::core::runtime::PoolRuntime;
use crate::provision::{
    open_secrets, resolve_server_key, template, ProvisionSettings, Provisioner, RetryPolicy,
    SecretsProvider,
};
use anyhow::{Context, Result};
use clap::Args;
use std::io::Write;
use std::path::PathBuf;

/// Provision a WireGuard peer and print its config.
#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Write the client config here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Append the peer's `[Peer]` section to this server config.
    #[arg(long)]
    pub append_peer: Option<PathBuf>,
}

/// Run the provision command.
pub async fn run_provision(args: ProvisionArgs, opts: &GlobalOptions) -> Result<()> {
    let config = opts.load_config()?;
    init_tracing(&config.telemetry.log_level);

    let secrets = open_secrets(&config)?;
    let server_key = resolve_server_key(
        &config,
        secrets.as_ref().map(|s| s as &dyn SecretsProvider),
    )?;
    let settings = ProvisionSettings::from_config(&config, server_key.keys.public)?;
    let retry = RetryPolicy::from_config(&config);

    let mut runtime = PoolRuntime::start(config).await?;
    let provisioner = Provisioner::new(runtime.coordinator().clone(), settings, retry);
    let result = provisioner.provision(&runtime.op_context()).await;
    runtime.shutdown().await?;
    let peer = result?;

    if let Some(path) = args.append_peer {
        let section = template::render_peer_section(&peer.public_key, peer.address);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open server config: {:?}", path))?;
        write!(file, "\n{}", section)
            .with_context(|| format!("failed to append peer to {:?}", path))?;
    }

    match args.output {
        Some(path) => {
            std::fs::write(&path, &peer.config)
                .with_context(|| format!("failed to write client config: {:?}", path))?;
            println!("Provisioned {} -> {:?}", peer.address, path);
        }
        None => print!("{}", peer.config),
    }
    Ok(())
}
