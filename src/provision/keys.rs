//! WireGuard (Curve25519) keys.
//!
//! Keys travel as 44-character standard base64, the format `wg genkey` and
//! `wg pubkey` use.

use crate::core::error::{ProvisionError, ProvisionResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use curve25519_dalek::montgomery::MontgomeryPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::io::Write;
use std::path::Path;

/// Raw key length.
pub const KEY_LEN: usize = 32;

/// Clamped X25519 private key.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey([u8; KEY_LEN]);

/// X25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_LEN]);

fn clamp(mut bytes: [u8; KEY_LEN]) -> [u8; KEY_LEN] {
    bytes[0] &= 248;
    bytes[31] &= 127;
    bytes[31] |= 64;
    bytes
}

fn decode_key(encoded: &str) -> ProvisionResult<[u8; KEY_LEN]> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| ProvisionError::InvalidKey(e.to_string()))?;
    <[u8; KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
        ProvisionError::InvalidKey(format!("expected {} bytes, got {}", KEY_LEN, bytes.len()))
    })
}

impl PrivateKey {
    /// Generate a fresh key from the OS random source.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(clamp(bytes))
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(clamp(bytes))
    }

    pub fn from_base64(encoded: &str) -> ProvisionResult<Self> {
        decode_key(encoded).map(Self::from_bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(MontgomeryPoint::mul_base_clamped(self.0).to_bytes())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

impl PublicKey {
    pub fn from_base64(encoded: &str) -> ProvisionResult<Self> {
        decode_key(encoded).map(Self)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}

/// A private key with its public half.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private: PrivateKey,
    pub public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self::from_private(PrivateKey::generate())
    }

    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }

    pub fn from_private_base64(encoded: &str) -> ProvisionResult<Self> {
        PrivateKey::from_base64(encoded).map(Self::from_private)
    }
}

/// Server key as loaded at startup.
#[derive(Debug, Clone)]
pub struct ServerKey {
    pub keys: KeyPair,
    /// True when the key was created by this call.
    pub generated: bool,
}

/// Load the server private key from `path`, creating it if absent.
///
/// New keys are written with mode 0600 on Unix.
pub fn load_or_generate_server_key(path: &Path) -> ProvisionResult<ServerKey> {
    let key_file_error = |source| ProvisionError::KeyFile {
        path: path.display().to_string(),
        source,
    };

    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let keys = KeyPair::from_private_base64(&contents)?;
            tracing::info!(path = %path.display(), public_key = %keys.public, "loaded server key");
            return Ok(ServerKey {
                keys,
                generated: false,
            });
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(key_file_error(e)),
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(key_file_error)?;
    }

    let keys = KeyPair::generate();
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(key_file_error)?;
    file.write_all(keys.private.to_base64().as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(key_file_error)?;

    tracing::info!(path = %path.display(), public_key = %keys.public, "generated server key");
    Ok(ServerKey {
        keys,
        generated: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // X25519 test vector (Alice) from RFC 7748 section 6.1.
    const ALICE_PRIVATE: &str = "dwdtCnMYpX08FsFyUbJmRd9ML4frwJkqsXf7pR25LCo=";
    const ALICE_PUBLIC: &str = "hSDwCYkwp1R0i33ctD73Wg2/Og0mOBr066SpjqqbTmo=";

    #[test]
    fn test_known_vector() {
        let pair = KeyPair::from_private_base64(ALICE_PRIVATE).unwrap();
        assert_eq!(pair.public.to_base64(), ALICE_PUBLIC);
    }

    #[test]
    fn test_generated_key_is_clamped() {
        let key = PrivateKey::generate();
        let bytes = STANDARD.decode(key.to_base64()).unwrap();
        assert_eq!(bytes[0] & 7, 0);
        assert_eq!(bytes[31] & 0x80, 0);
        assert_eq!(bytes[31] & 0x40, 0x40);
        assert_eq!(key.to_base64().len(), 44);
    }

    #[test]
    fn test_invalid_keys_rejected() {
        assert!(matches!(
            PrivateKey::from_base64("not base64!"),
            Err(ProvisionError::InvalidKey(_))
        ));
        assert!(matches!(
            PublicKey::from_base64("AAAA"),
            Err(ProvisionError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let pair = KeyPair::generate();
        let debug = format!("{:?}", pair);
        assert!(!debug.contains(&pair.private.to_base64()));
        assert!(debug.contains(&pair.public.to_base64()));
    }

    #[test]
    fn test_load_or_generate_server_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("server_private.key");

        let first = load_or_generate_server_key(&path).unwrap();
        assert!(first.generated);
        let second = load_or_generate_server_key(&path).unwrap();
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
    fn test_corrupt_key_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server_private.key");
        std::fs::write(&path, "garbage").unwrap();
        assert!(load_or_generate_server_key(&path).is_err());
    }
}
