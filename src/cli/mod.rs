//! Command-line interface.
//!
//! Unified CLI for Wireable operations.

pub mod commands;

use crate::core::config::{Config, ConfigOverrides};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/wireable.toml";

/// Wireable - distributed IP address pool for WireGuard peers.
#[derive(Parser, Debug)]
#[command(name = "wireable")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Options shared by every command.
    pub fn global_options(&self) -> GlobalOptions {
        GlobalOptions {
            config_path: self
                .config
                .as_deref()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            overrides: ConfigOverrides {
                log_level: self.log_level.clone(),
                ..Default::default()
            },
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pool until shutdown.
    Start(commands::StartArgs),
    /// Create the storage directory, server key and server config.
    Init(commands::InitArgs),
    /// Seed the store with the configured block.
    Seed(commands::SeedArgs),
    /// Allocate one address.
    Allocate(commands::AllocateArgs),
    /// Release an address.
    Release(commands::ReleaseArgs),
    /// Show pool usage.
    Status(commands::StatusArgs),
    /// Provision a WireGuard peer and print its config.
    Provision(commands::ProvisionArgs),
    /// Configuration operations.
    Config(commands::ConfigArgs),
}

/// Config location and overrides from global flags.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub config_path: PathBuf,
    pub overrides: ConfigOverrides,
}

impl GlobalOptions {
    /// Load, override and validate the configuration.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::from_file(&self.config_path)
            .with_context(|| format!("failed to load config from {:?}", self.config_path))?;
        config.apply_overrides(&self.overrides);
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// Initialize tracing subscriber if the telemetry feature is enabled.
///
/// `RUST_LOG` takes precedence over `level`.
#[cfg(feature = "telemetry")]
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "telemetry"))]
pub fn init_tracing(_level: &str) {}
