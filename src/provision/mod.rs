//! WireGuard peer provisioning.
//!
//! A provisioning request generates a client key pair, allocates an address
//! owned by the client's public key, and renders the client config. If the
//! config cannot be rendered the address is released again.
//!
//! - [`keys`]: Curve25519 keys and the server key file
//! - [`template`]: client and server config rendering
//! - [`secrets`]: secret lookup for the server key

pub mod keys;
pub mod secrets;
pub mod template;

pub use keys::{load_or_generate_server_key, KeyPair, PrivateKey, PublicKey, ServerKey};
pub use secrets::{FileSecretsProvider, SecretsProvider};

use crate::core::config::Config;
use crate::core::error::{PoolError, PoolResult, ProvisionError, ProvisionResult};
use crate::pool::{Address, AllocationCoordinator, OpContext};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use template::ClientConfigParams;

/// Caller-side retry for allocation.
///
/// Conflicts retry immediately, store failures after `backoff`, everything
/// else fails at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.provisioning.max_allocate_attempts,
            backoff: config.retry_backoff(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Allocate for `owner`, retrying per `policy`.
pub async fn allocate_with_retry(
    coordinator: &AllocationCoordinator,
    owner: &str,
    ctx: &OpContext,
    policy: RetryPolicy,
) -> PoolResult<Address> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let err = match coordinator.allocate(owner, ctx).await {
            Ok(addr) => return Ok(addr),
            Err(err) => err,
        };
        if !err.is_retriable() || attempt >= attempts {
            return Err(err);
        }

        tracing::debug!(owner, attempt, error = %err, "retrying allocation");
        if matches!(err, PoolError::StoreUnavailable { .. }) {
            tokio::time::sleep(policy.backoff).await;
        }
        attempt += 1;
    }
}

/// Server-side settings shared by every provisioned peer.
#[derive(Debug, Clone)]
pub struct ProvisionSettings {
    pub server_public_key: PublicKey,
    pub server_endpoint: String,
    pub allowed_ips: String,
    pub dns: Option<String>,
    pub persistent_keepalive: Option<u16>,
    /// Custom client template; the built-in layout when `None`.
    pub client_template: Option<String>,
}

impl ProvisionSettings {
    /// Settings from the `[provisioning]` section.
    ///
    /// Reads the custom client template, if one is configured.
    pub fn from_config(config: &Config, server_public_key: PublicKey) -> ProvisionResult<Self> {
        let p = &config.provisioning;
        let server_endpoint = p
            .server_endpoint
            .clone()
            .ok_or(ProvisionError::MissingSetting("provisioning.server_endpoint"))?;
        let client_template = p
            .client_template_path
            .as_deref()
            .map(|path| template::load_template(Path::new(path)))
            .transpose()?;

        Ok(Self {
            server_public_key,
            server_endpoint,
            allowed_ips: p.allowed_ips.clone(),
            dns: p.dns.clone(),
            persistent_keepalive: p.persistent_keepalive,
            client_template,
        })
    }
}

/// A provisioned peer.
#[derive(Debug, Clone)]
pub struct PeerProvision {
    pub address: Address,
    pub public_key: PublicKey,
    /// Rendered client config, including the client's private key.
    pub config: String,
}

/// Runs the provisioning flow against a coordinator.
#[derive(Debug, Clone)]
pub struct Provisioner {
    coordinator: Arc<AllocationCoordinator>,
    settings: ProvisionSettings,
    retry: RetryPolicy,
}

impl Provisioner {
    pub fn new(
        coordinator: Arc<AllocationCoordinator>,
        settings: ProvisionSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            coordinator,
            settings,
            retry,
        }
    }

    pub fn settings(&self) -> &ProvisionSettings {
        &self.settings
    }

    /// Provision one peer.
    pub async fn provision(&self, ctx: &OpContext) -> ProvisionResult<PeerProvision> {
        let client = KeyPair::generate();
        let owner = client.public.to_base64();
        let address = allocate_with_retry(&self.coordinator, &owner, ctx, self.retry).await?;

        let params = ClientConfigParams {
            private_key: &client.private,
            address,
            server_public_key: &self.settings.server_public_key,
            server_endpoint: &self.settings.server_endpoint,
            allowed_ips: &self.settings.allowed_ips,
            dns: self.settings.dns.as_deref(),
            persistent_keepalive: self.settings.persistent_keepalive,
        };

        match template::render_client_config(&params, self.settings.client_template.as_deref()) {
            Ok(config) => {
                tracing::info!(address = %address, public_key = %client.public, "peer provisioned");
                Ok(PeerProvision {
                    address,
                    public_key: client.public,
                    config,
                })
            }
            Err(err) => {
                tracing::warn!(address = %address, error = %err, "config rendering failed, releasing address");
                if let Err(release_err) = self.coordinator.release(address, ctx).await {
                    tracing::error!(
                        address = %address,
                        error = %release_err,
                        "failed to release address after rendering failure"
                    );
                }
                Err(err)
            }
        }
    }
}

/// Resolve the server key from the secrets file or the key file.
pub fn resolve_server_key(
    config: &Config,
    secrets: Option<&dyn SecretsProvider>,
) -> ProvisionResult<ServerKey> {
    match (&config.provisioning.server_key_secret, secrets) {
        (Some(secret), Some(provider)) => {
            let encoded = provider.get_secret(&secret.mount, &secret.name, &secret.key)?;
            let keys = KeyPair::from_private_base64(&encoded)?;
            tracing::info!(
                mount = %secret.mount,
                name = %secret.name,
                public_key = %keys.public,
                "loaded server key from secrets"
            );
            Ok(ServerKey {
                keys,
                generated: false,
            })
        }
        (Some(_), None) => Err(ProvisionError::MissingSetting("secrets.path")),
        (None, _) => load_or_generate_server_key(Path::new(&config.provisioning.server_key_path)),
    }
}

/// Open the configured secrets file, if any.
pub fn open_secrets(config: &Config) -> ProvisionResult<Option<FileSecretsProvider>> {
    config
        .secrets
        .path
        .as_deref()
        .map(|path| FileSecretsProvider::load(Path::new(path)))
        .transpose()
}
