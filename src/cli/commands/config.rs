//! Config command implementation.

use crate::cli::GlobalOptions;
use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::Path;

/// Configuration operations.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Validate the configuration file.
    Validate,
    /// Print the effective configuration with defaults.
    Show {
        /// Output format (toml, json).
        #[arg(long, default_value = "toml")]
        format: String,
    },
    /// Generate a configuration template.
    Generate {
        /// Output file path.
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
        /// Store mode (embedded, etcd).
        #[arg(long, default_value = "embedded")]
        store: String,
    },
}

/// Run the config command.
pub fn run_config(args: ConfigArgs, opts: &GlobalOptions) -> Result<()> {
    match args.command {
        ConfigCommand::Validate => validate_config(opts),
        ConfigCommand::Show { format } => show_config(opts, &format),
        ConfigCommand::Generate { output, store } => generate_config(output.as_deref(), &store),
    }
}

fn validate_config(opts: &GlobalOptions) -> Result<()> {
    let config = opts.load_config()?;
    let space = config.address_space()?;

    println!("✓ Configuration is valid: {:?}", opts.config_path);
    println!("  Block:      {} ({} usable)", space, space.usable_count());
    println!("  Store:      {}", config.store.mode);
    if space.usable_count() > u128::from(config.pool.max_seed_addresses) {
        println!(
            "  ⚠ Warning: block exceeds pool.max_seed_addresses ({}), seeding will be refused",
            config.pool.max_seed_addresses
        );
    }
    if config.provisioning.server_endpoint.is_none() {
        println!("  ⚠ Warning: provisioning.server_endpoint not set (required for provision)");
    }
    Ok(())
}

fn show_config(opts: &GlobalOptions, format: &str) -> Result<()> {
    let config = opts.load_config()?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        _ => print!("{}", toml::to_string_pretty(&config)?),
    }
    Ok(())
}

fn generate_config(output: Option<&Path>, store: &str) -> Result<()> {
    let template = match store {
        "etcd" => generate_etcd_template(),
        _ => generate_embedded_template(),
    };

    match output {
        Some(path) => {
            std::fs::write(path, &template)?;
            println!("Generated {} config template: {:?}", store, path);
        }
        None => {
            println!("{}", template);
        }
    }

    Ok(())
}

fn generate_embedded_template() -> String {
    r#"# Wireable configuration (embedded store)

[pool]
cidr = "10.8.0.0/24"
namespace = "/ip-pool"
seed_on_start = true

[store]
mode = "embedded"
sync_writes = true
compact_every = 8192

[provisioning]
server_endpoint = "vpn.example.com:51820"
server_key_path = "data/server_private.key"
listen_port = 51820
allowed_ips = "0.0.0.0/0"
persistent_keepalive = 25

[telemetry]
log_level = "info"

[paths]
storage_dir = "data"
"#
    .to_string()
}

fn generate_etcd_template() -> String {
    r#"# Wireable configuration (etcd store)

[pool]
cidr = "10.8.0.0/16"
namespace = "/ip-pool"
seed_on_start = true
max_seed_addresses = 65536

[store]
mode = "etcd"
endpoints = ["http://127.0.0.1:2379"]
dial_timeout_ms = 5000
request_timeout_ms = 3000

[provisioning]
server_endpoint = "vpn.example.com:51820"
server_key_secret = { mount = "kv", name = "wireguard", key = "server_private_key" }
listen_port = 51820
allowed_ips = "0.0.0.0/0"
max_allocate_attempts = 8
retry_backoff_ms = 100

[secrets]
path = "/etc/wireable/secrets.toml"

[telemetry]
log_level = "info"
"#
    .to_string()
}
