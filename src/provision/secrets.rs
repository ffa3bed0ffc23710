//! Secret lookup.
//!
//! Secrets are addressed as `mount / name / key`. The file provider reads a
//! TOML document shaped like a KV secrets engine:
//!
//! ```toml
//! [kv.wireguard]
//! server_private_key = "..."
//! ```

use crate::core::error::{ProvisionError, ProvisionResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Source of secret values.
pub trait SecretsProvider: Send + Sync {
    /// Fetch one string value.
    fn get_secret(&self, mount: &str, name: &str, key: &str) -> ProvisionResult<String>;
}

type Mounts = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

/// Secrets read from a TOML file.
#[derive(Debug, Clone, Default)]
pub struct FileSecretsProvider {
    path: Option<PathBuf>,
    mounts: Mounts,
}

impl FileSecretsProvider {
    pub fn load(path: &Path) -> ProvisionResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::Secrets(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut provider = Self::from_toml(&content)?;
        provider.path = Some(path.to_path_buf());
        Ok(provider)
    }

    pub fn from_toml(content: &str) -> ProvisionResult<Self> {
        let mounts: Mounts =
            toml::from_str(content).map_err(|e| ProvisionError::Secrets(e.to_string()))?;
        Ok(Self { path: None, mounts })
    }

    /// File the secrets were read from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl SecretsProvider for FileSecretsProvider {
    fn get_secret(&self, mount: &str, name: &str, key: &str) -> ProvisionResult<String> {
        self.mounts
            .get(mount)
            .and_then(|secrets| secrets.get(name))
            .and_then(|values| values.get(key))
            .cloned()
            .ok_or_else(|| ProvisionError::SecretNotFound {
                mount: mount.to_string(),
                name: name.to_string(),
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRETS: &str = r#"
        [kv.wireguard]
        server_private_key = "dwdtCnMYpX08FsFyUbJmRd9ML4frwJkqsXf7pR25LCo="

        [kv.api]
        username = "admin"
    "#;

    #[test]
    fn test_lookup() {
        let provider = FileSecretsProvider::from_toml(SECRETS).unwrap();
        assert_eq!(provider.get_secret("kv", "api", "username").unwrap(), "admin");
        assert!(matches!(
            provider.get_secret("kv", "api", "password"),
            Err(ProvisionError::SecretNotFound { .. })
        ));
        assert!(provider.get_secret("other", "api", "username").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secrets.toml");
        std::fs::write(&path, SECRETS).unwrap();

        let provider = FileSecretsProvider::load(&path).unwrap();
        assert_eq!(provider.path(), Some(path.as_path()));
        assert!(provider
            .get_secret("kv", "wireguard", "server_private_key")
            .is_ok());
    }

    #[test]
    fn test_non_string_values_rejected() {
        assert!(matches!(
            FileSecretsProvider::from_toml("[kv.api]\nport = 8080\n"),
            Err(ProvisionError::Secrets(_))
        ));
    }
}
