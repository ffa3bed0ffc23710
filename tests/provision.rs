//! Peer provisioning tests against a running pool.

mod common;

use common::{temp_test_dir, test_config};
use std::collections::HashSet;
use wireable::core::error::{PoolError, ProvisionError};
use wireable::core::runtime::PoolRuntime;
use wireable::provision::{
    load_or_generate_server_key, open_secrets, resolve_server_key, template, KeyPair,
    ProvisionSettings, Provisioner, PublicKey, RetryPolicy, SecretsProvider,
};

async fn provisioner_for(runtime: &PoolRuntime, server: PublicKey) -> Provisioner {
    let settings = ProvisionSettings::from_config(runtime.config(), server).unwrap();
    Provisioner::new(
        runtime.coordinator().clone(),
        settings,
        RetryPolicy::from_config(runtime.config()),
    )
}

#[tokio::test]
async fn provision_peers_until_exhausted() {
    let dir = temp_test_dir();
    let config = test_config("10.9.0.0/29", dir.path());
    let server = load_or_generate_server_key(dir.path().join("server_private.key").as_path())
        .unwrap();
    assert!(server.generated);

    let mut runtime = PoolRuntime::start(config).await.unwrap();
    let provisioner = provisioner_for(&runtime, server.keys.public).await;
    let ctx = runtime.op_context();

    let mut addresses = HashSet::new();
    for _ in 0..6 {
        let peer = provisioner.provision(&ctx).await.unwrap();
        assert!(peer
            .config
            .contains(&format!("Address = {}/32\n", peer.address)));
        assert!(peer
            .config
            .contains(&format!("PublicKey = {}\n", server.keys.public)));
        assert!(peer.config.contains("Endpoint = vpn.example.com:51820\n"));

        let owner = runtime
            .coordinator()
            .owner_of(peer.address, &ctx)
            .await
            .unwrap();
        assert_eq!(owner, Some(peer.public_key.to_base64()));
        assert!(addresses.insert(peer.address));
    }

    let err = provisioner.provision(&ctx).await.unwrap_err();
    assert!(matches!(err, ProvisionError::Pool(PoolError::PoolExhausted)));
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn provisioned_client_key_matches_peer_section() {
    let dir = temp_test_dir();
    let server = KeyPair::generate();
    let mut runtime = PoolRuntime::start(test_config("10.9.0.0/30", dir.path()))
        .await
        .unwrap();
    let provisioner = provisioner_for(&runtime, server.public).await;

    let peer = provisioner.provision(&runtime.op_context()).await.unwrap();
    let private = peer
        .config
        .lines()
        .find_map(|line| line.strip_prefix("PrivateKey = "))
        .unwrap();
    let client = KeyPair::from_private_base64(private).unwrap();
    assert_eq!(client.public, peer.public_key);

    let section = template::render_peer_section(&peer.public_key, peer.address);
    assert_eq!(
        section,
        format!("[Peer]\nPublicKey = {}\nAllowedIPs = 10.9.0.2/32\n", peer.public_key)
    );
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn custom_template_is_rendered() {
    let dir = temp_test_dir();
    let template_path = dir.path().join("client.conf.tmpl");
    std::fs::write(
        &template_path,
        "# {{ address }}\n[Interface]\nPrivateKey = {{ private_key }}\nDNS = {{ dns }}\n",
    )
    .unwrap();

    let mut config = test_config("10.9.0.0/30", dir.path());
    config.provisioning.client_template_path = Some(template_path.display().to_string());
    config.provisioning.dns = Some("1.1.1.1".to_string());

    let server = KeyPair::generate();
    let mut runtime = PoolRuntime::start(config).await.unwrap();
    let provisioner = provisioner_for(&runtime, server.public).await;
    let peer = provisioner.provision(&runtime.op_context()).await.unwrap();

    assert!(peer.config.starts_with("# 10.9.0.2/32\n[Interface]\n"));
    assert!(peer.config.ends_with("DNS = 1.1.1.1\n"));
    runtime.shutdown().await.unwrap();
}

#[test]
fn server_key_is_stable_across_loads() {
    let dir = temp_test_dir();
    let path = dir.path().join("keys").join("server_private.key");

    let first = load_or_generate_server_key(&path).unwrap();
    let second = load_or_generate_server_key(&path).unwrap();
    assert!(first.generated);
    assert!(!second.generated);
    assert_eq!(first.keys.public, second.keys.public);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[test]
fn corrupt_server_key_is_rejected() {
    let dir = temp_test_dir();
    let path = dir.path().join("server_private.key");
    std::fs::write(&path, "not a key").unwrap();
    assert!(matches!(
        load_or_generate_server_key(&path),
        Err(ProvisionError::InvalidKey(_))
    ));
}

#[test]
fn server_key_from_secrets_file() {
    let dir = temp_test_dir();
    let server = KeyPair::generate();
    let secrets_path = dir.path().join("secrets.toml");
    std::fs::write(
        &secrets_path,
        format!(
            "[wireguard.server]\nprivate_key = \"{}\"\n",
            server.private.to_base64()
        ),
    )
    .unwrap();

    let mut config = test_config("10.9.0.0/24", dir.path());
    config.secrets.path = Some(secrets_path.display().to_string());
    config.provisioning.server_key_secret = Some(wireable::core::config::SecretRef {
        mount: "wireguard".to_string(),
        name: "server".to_string(),
        key: "private_key".to_string(),
    });
    config.validate().unwrap();

    let secrets = open_secrets(&config).unwrap();
    let resolved = resolve_server_key(
        &config,
        secrets.as_ref().map(|s| s as &dyn SecretsProvider),
    )
    .unwrap();
    assert!(!resolved.generated);
    assert_eq!(resolved.keys.public, server.public);
    assert!(!dir.path().join("server_private.key").exists());
}
