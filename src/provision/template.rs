//! WireGuard config rendering.
//!
//! Custom client templates use `{{ name }}` placeholders. Known names:
//! `private_key`, `address`, `server_public_key`, `server_endpoint`,
//! `allowed_ips`, `dns`, `persistent_keepalive`. Optional values render as
//! an empty string when unset.

use super::keys::{PrivateKey, PublicKey};
use crate::core::error::{ProvisionError, ProvisionResult};
use crate::pool::Address;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

/// Values for a client config.
#[derive(Debug, Clone)]
pub struct ClientConfigParams<'a> {
    pub private_key: &'a PrivateKey,
    pub address: Address,
    pub server_public_key: &'a PublicKey,
    pub server_endpoint: &'a str,
    pub allowed_ips: &'a str,
    pub dns: Option<&'a str>,
    pub persistent_keepalive: Option<u16>,
}

impl ClientConfigParams<'_> {
    fn values(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            ("private_key", self.private_key.to_base64()),
            ("address", host_cidr(&self.address)),
            ("server_public_key", self.server_public_key.to_base64()),
            ("server_endpoint", self.server_endpoint.to_string()),
            ("allowed_ips", self.allowed_ips.to_string()),
            ("dns", self.dns.unwrap_or_default().to_string()),
            (
                "persistent_keepalive",
                self.persistent_keepalive
                    .map(|k| k.to_string())
                    .unwrap_or_default(),
            ),
        ])
    }
}

/// Single-host CIDR for an address (`/32` or `/128`).
pub fn host_cidr(addr: &Address) -> String {
    match addr {
        Address::V4(_) => format!("{}/32", addr),
        Address::V6(_) => format!("{}/128", addr),
    }
}

/// Render a client config, using the built-in layout when `template` is `None`.
pub fn render_client_config(
    params: &ClientConfigParams<'_>,
    template: Option<&str>,
) -> ProvisionResult<String> {
    match template {
        Some(template) => render(template, &params.values()),
        None => Ok(default_client_config(params)),
    }
}

fn default_client_config(params: &ClientConfigParams<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[Interface]");
    let _ = writeln!(out, "PrivateKey = {}", params.private_key.to_base64());
    let _ = writeln!(out, "Address = {}", host_cidr(&params.address));
    if let Some(dns) = params.dns {
        let _ = writeln!(out, "DNS = {}", dns);
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[Peer]");
    let _ = writeln!(out, "PublicKey = {}", params.server_public_key);
    let _ = writeln!(out, "Endpoint = {}", params.server_endpoint);
    let _ = writeln!(out, "AllowedIPs = {}", params.allowed_ips);
    if let Some(keepalive) = params.persistent_keepalive {
        let _ = writeln!(out, "PersistentKeepalive = {}", keepalive);
    }
    out
}

/// Render the server's `[Interface]` section.
///
/// `address` is the server's own tunnel address, written with the pool's
/// prefix length.
pub fn render_server_interface(
    private_key: &PrivateKey,
    address: Address,
    prefix_len: u8,
    listen_port: u16,
) -> String {
    format!(
        "[Interface]\nPrivateKey = {}\nAddress = {}/{}\nListenPort = {}\n",
        private_key.to_base64(),
        address,
        prefix_len,
        listen_port
    )
}

/// Render the server-side `[Peer]` section for a provisioned client.
pub fn render_peer_section(public_key: &PublicKey, address: Address) -> String {
    format!(
        "[Peer]\nPublicKey = {}\nAllowedIPs = {}\n",
        public_key,
        host_cidr(&address)
    )
}

/// Read a custom template and check its placeholders.
pub fn load_template(path: &Path) -> ProvisionResult<String> {
    let template = std::fs::read_to_string(path).map_err(|e| {
        ProvisionError::Template(format!("failed to read {}: {}", path.display(), e))
    })?;
    check_placeholders(&template)?;
    Ok(template)
}

/// Substitute `{{ name }}` placeholders. Unknown names are an error.
pub fn render(template: &str, values: &BTreeMap<&'static str, String>) -> ProvisionResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| ProvisionError::Template("unclosed placeholder".to_string()))?;
        let name = after[..end].trim();
        let value = values
            .get(name)
            .ok_or_else(|| ProvisionError::Template(format!("unknown placeholder: {}", name)))?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn check_placeholders(template: &str) -> ProvisionResult<()> {
    const KNOWN: [&str; 7] = [
        "private_key",
        "address",
        "server_public_key",
        "server_endpoint",
        "allowed_ips",
        "dns",
        "persistent_keepalive",
    ];
    let values = KNOWN.iter().map(|k| (*k, String::new())).collect();
    render(template, &values).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::keys::KeyPair;

    fn params<'a>(client: &'a KeyPair, server: &'a KeyPair) -> ClientConfigParams<'a> {
        ClientConfigParams {
            private_key: &client.private,
            address: "10.8.0.2".parse().unwrap(),
            server_public_key: &server.public,
            server_endpoint: "vpn.example.com:51820",
            allowed_ips: "0.0.0.0/0",
            dns: None,
            persistent_keepalive: Some(25),
        }
    }

    #[test]
    fn test_default_client_config() {
        let client = KeyPair::generate();
        let server = KeyPair::generate();
        let config = render_client_config(&params(&client, &server), None).unwrap();

        assert!(config.starts_with("[Interface]\n"));
        assert!(config.contains(&format!("PrivateKey = {}\n", client.private.to_base64())));
        assert!(config.contains("Address = 10.8.0.2/32\n"));
        assert!(!config.contains("DNS"));
        assert!(config.contains(&format!("PublicKey = {}\n", server.public)));
        assert!(config.contains("Endpoint = vpn.example.com:51820\n"));
        assert!(config.contains("PersistentKeepalive = 25\n"));
    }

    #[test]
    fn test_custom_template() {
        let client = KeyPair::generate();
        let server = KeyPair::generate();
        let template = "Address={{ address }} Peer={{server_public_key}} DNS={{dns}}";
        let config = render_client_config(&params(&client, &server), Some(template)).unwrap();
        assert_eq!(
            config,
            format!("Address=10.8.0.2/32 Peer={} DNS=", server.public)
        );
    }

    #[test]
    fn test_template_errors() {
        let client = KeyPair::generate();
        let server = KeyPair::generate();
        let p = params(&client, &server);
        assert!(matches!(
            render_client_config(&p, Some("{{ bogus }}")),
            Err(ProvisionError::Template(_))
        ));
        assert!(matches!(
            render_client_config(&p, Some("{{ address")),
            Err(ProvisionError::Template(_))
        ));
    }

    #[test]
    fn test_load_template_checks_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.conf");
        std::fs::write(&good, "[Interface]\nAddress = {{address}}\n").unwrap();
        assert!(load_template(&good).is_ok());

        let bad = dir.path().join("bad.conf");
        std::fs::write(&bad, "Key = {{ PrivateKey }}\n").unwrap();
        assert!(load_template(&bad).is_err());

        assert!(load_template(&dir.path().join("missing.conf")).is_err());
    }

    #[test]
    fn test_server_interface_and_peer() {
        let server = KeyPair::generate();
        let iface = render_server_interface(&server.private, "10.8.0.1".parse().unwrap(), 24, 51820);
        assert_eq!(
            iface,
            format!(
                "[Interface]\nPrivateKey = {}\nAddress = 10.8.0.1/24\nListenPort = 51820\n",
                server.private.to_base64()
            )
        );

        let peer = render_peer_section(&server.public, "fd00::2".parse().unwrap());
        assert!(peer.contains("AllowedIPs = fd00::2/128\n"));
    }
}
