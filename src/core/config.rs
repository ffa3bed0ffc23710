//! Configuration parsing and validation.
//!
//! Wireable configuration is loaded from TOML files with CLI overrides.

use crate::pool::{AddressSpace, PoolKeys};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the embedded store snapshot inside `paths.storage_dir`.
pub const SNAPSHOT_FILE: &str = "pool.snapshot";

/// Top-level Wireable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address pool configuration.
    pub pool: PoolConfig,

    /// Backing store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Peer provisioning configuration.
    #[serde(default)]
    pub provisioning: ProvisioningConfig,

    /// Secrets file configuration.
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Filesystem paths.
    #[serde(default)]
    pub paths: PathConfig,
}

/// Address pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// CIDR block to allocate from, e.g. "10.8.0.0/24".
    pub cidr: String,

    /// Key prefix for the pool records.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Seed missing availability records at startup.
    #[serde(default = "default_seed_on_start")]
    pub seed_on_start: bool,

    /// Largest block that seeding will accept.
    #[serde(default = "default_max_seed_addresses")]
    pub max_seed_addresses: u64,
}

/// Backing store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Mode: "embedded" or "etcd".
    #[serde(default = "default_store_mode")]
    pub mode: String,

    /// etcd endpoints for etcd mode.
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,

    /// Per-operation deadline in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Buffered watch events per subscription.
    #[serde(default = "default_watch_buffer")]
    pub watch_buffer: usize,

    /// Embedded store: fsync the journal after every commit.
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,

    /// Embedded store: journal entries between snapshot compactions.
    #[serde(default = "default_compact_every")]
    pub compact_every: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mode: default_store_mode(),
            endpoints: Vec::new(),
            dial_timeout_ms: default_dial_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            watch_buffer: default_watch_buffer(),
            sync_writes: default_sync_writes(),
            compact_every: default_compact_every(),
        }
    }
}

/// Peer provisioning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Public endpoint clients connect to, e.g. "vpn.example.com:51820".
    #[serde(default)]
    pub server_endpoint: Option<String>,

    /// Server private key file.
    #[serde(default = "default_server_key_path")]
    pub server_key_path: String,

    /// Fetch the server private key from the secrets file instead.
    #[serde(default)]
    pub server_key_secret: Option<SecretRef>,

    /// Server listen port.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// AllowedIPs written into client configs.
    #[serde(default = "default_allowed_ips")]
    pub allowed_ips: String,

    /// DNS server written into client configs.
    #[serde(default)]
    pub dns: Option<String>,

    /// PersistentKeepalive in seconds.
    #[serde(default)]
    pub persistent_keepalive: Option<u16>,

    /// Custom client config template.
    #[serde(default)]
    pub client_template_path: Option<String>,

    /// Allocation attempts per provisioning request.
    #[serde(default = "default_max_allocate_attempts")]
    pub max_allocate_attempts: u32,

    /// Backoff between attempts after a store failure.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            server_endpoint: None,
            server_key_path: default_server_key_path(),
            server_key_secret: None,
            listen_port: default_listen_port(),
            allowed_ips: default_allowed_ips(),
            dns: None,
            persistent_keepalive: None,
            client_template_path: None,
            max_allocate_attempts: default_max_allocate_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Location of a value in the secrets file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    pub mount: String,
    pub name: String,
    pub key: String,
}

/// Secrets file configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// TOML secrets file.
    #[serde(default)]
    pub path: Option<String>,
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Filesystem path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Storage directory for the embedded store snapshot.
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
        }
    }
}

// Default value functions

fn default_namespace() -> String {
    crate::pool::keys::DEFAULT_NAMESPACE.to_string()
}

fn default_seed_on_start() -> bool {
    true
}

fn default_max_seed_addresses() -> u64 {
    65_536
}

fn default_store_mode() -> String {
    "embedded".to_string()
}

fn default_dial_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    3_000
}

fn default_watch_buffer() -> usize {
    1_024
}

fn default_sync_writes() -> bool {
    true
}

fn default_compact_every() -> u64 {
    8_192
}

fn default_server_key_path() -> String {
    "server_private.key".to_string()
}

fn default_listen_port() -> u16 {
    51_820
}

fn default_allowed_ips() -> String {
    "0.0.0.0/0".to_string()
}

fn default_max_allocate_attempts() -> u32 {
    8
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_storage_dir() -> String {
    "data".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(ref storage_dir) = overrides.storage_dir {
            self.paths.storage_dir = storage_dir.clone();
        }
        if let Some(ref cidr) = overrides.cidr {
            self.pool.cidr = cidr.clone();
        }
        if !overrides.etcd_endpoints.is_empty() {
            self.store.mode = "etcd".to_string();
            self.store.endpoints = overrides.etcd_endpoints.clone();
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        self.validate_pool()?;
        self.validate_store()?;
        self.validate_provisioning()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_pool(&self) -> Result<()> {
        AddressSpace::parse(&self.pool.cidr)
            .map_err(|e| anyhow::anyhow!("pool.cidr is invalid: {}", e))?;

        let ns = &self.pool.namespace;
        if !ns.starts_with('/') {
            anyhow::bail!("pool.namespace must start with '/', got: {}", ns);
        }
        if ns.len() > 1 && ns.ends_with('/') {
            anyhow::bail!("pool.namespace must not end with '/', got: {}", ns);
        }

        if self.pool.max_seed_addresses == 0 {
            anyhow::bail!("pool.max_seed_addresses must be > 0");
        }
        Ok(())
    }

    fn validate_store(&self) -> Result<()> {
        if self.store.mode != "embedded" && self.store.mode != "etcd" {
            anyhow::bail!(
                "store.mode must be 'embedded' or 'etcd', got: {}",
                self.store.mode
            );
        }

        if self.store.mode == "etcd" && self.store.endpoints.is_empty() {
            anyhow::bail!("store.endpoints required for etcd mode");
        }

        if self.store.dial_timeout_ms == 0 {
            anyhow::bail!("store.dial_timeout_ms must be > 0");
        }
        if self.store.request_timeout_ms == 0 {
            anyhow::bail!("store.request_timeout_ms must be > 0");
        }
        if self.store.watch_buffer == 0 {
            anyhow::bail!("store.watch_buffer must be > 0");
        }
        if self.store.compact_every == 0 {
            anyhow::bail!("store.compact_every must be > 0");
        }
        Ok(())
    }

    fn validate_provisioning(&self) -> Result<()> {
        if self.provisioning.max_allocate_attempts == 0 {
            anyhow::bail!("provisioning.max_allocate_attempts must be > 0");
        }

        if self.provisioning.server_key_secret.is_some() && self.secrets.path.is_none() {
            anyhow::bail!("secrets.path required when provisioning.server_key_secret is set");
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }

    /// Parsed pool block.
    pub fn address_space(&self) -> Result<AddressSpace> {
        AddressSpace::parse(&self.pool.cidr)
            .map_err(|e| anyhow::anyhow!("pool.cidr is invalid: {}", e))
    }

    pub fn pool_keys(&self) -> PoolKeys {
        PoolKeys::new(&self.pool.namespace)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        Path::new(&self.paths.storage_dir).join(SNAPSHOT_FILE)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.store.dial_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.store.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.provisioning.retry_backoff_ms)
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override storage directory.
    pub storage_dir: Option<String>,
    /// Override the pool block.
    pub cidr: Option<String>,
    /// Switch to etcd mode with these endpoints.
    pub etcd_endpoints: Vec<String>,
}
