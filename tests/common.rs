//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.

#![allow(dead_code)]

use std::future::Future;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use wireable::core::config::Config;
use wireable::core::runtime::PoolRuntime;
use wireable::pool::{seed_pool, Address, AddressSpace, OpContext, PoolKeys};
use wireable::store::MemoryPoolStore;

/// Create a minimal valid configuration file.
pub fn create_minimal_config() -> NamedTempFile {
    write_config("[pool]\ncidr = \"10.8.0.0/24\"\n")
}

/// Create a configuration file for `cidr` with storage under `storage_dir`.
pub fn create_config_with_paths(cidr: &str, storage_dir: &Path) -> NamedTempFile {
    write_config(&config_toml(cidr, storage_dir))
}

/// Write arbitrary config content to a temp file.
pub fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file
}

/// Load a config from a temp file.
pub fn load_config(file: &NamedTempFile) -> Config {
    Config::from_file(file.path()).expect("Failed to load config")
}

fn config_toml(cidr: &str, storage_dir: &Path) -> String {
    format!(
        r#"
[pool]
cidr = "{}"

[store]
request_timeout_ms = 2000

[provisioning]
server_endpoint = "vpn.example.com:51820"
server_key_path = "{}"

[paths]
storage_dir = "{}"
"#,
        cidr,
        storage_dir.join("server_private.key").display(),
        storage_dir.display()
    )
}

/// In-memory config for `cidr` with storage under `storage_dir`.
pub fn test_config(cidr: &str, storage_dir: &Path) -> Config {
    Config::from_toml(&config_toml(cidr, storage_dir)).expect("Failed to parse config")
}

/// Create a temporary directory for test data.
pub fn temp_test_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn addr(s: &str) -> Address {
    s.parse().expect("Failed to parse address")
}

/// Volatile store seeded with every usable address of `cidr`.
pub async fn seeded_store(cidr: &str) -> Arc<MemoryPoolStore> {
    let store = Arc::new(MemoryPoolStore::new());
    let space = AddressSpace::parse(cidr).expect("Failed to parse CIDR");
    seed_pool(
        store.as_ref(),
        &space,
        &PoolKeys::default(),
        65_536,
        &OpContext::default(),
    )
    .await
    .expect("Failed to seed store");
    store
}

/// Start a runtime ("node") on a shared store.
pub async fn start_node(cidr: &str, store: Arc<MemoryPoolStore>, dir: &Path) -> PoolRuntime {
    let mut config = test_config(cidr, dir);
    config.pool.seed_on_start = false;
    PoolRuntime::start_with_store(config, store)
        .await
        .expect("Failed to start runtime")
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Assert that a result is Ok and return the value.
#[track_caller]
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a result is Err.
#[track_caller]
pub fn assert_err<T: std::fmt::Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
        Err(e) => e,
    }
}
