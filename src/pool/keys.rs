//! Store key layout.
//!
//! Availability lives under `<namespace>/available/<address>` with an empty
//! value; ownership under `<namespace>/taken/<address>` with the owner
//! identifier as value.

use super::address::Address;

/// Default store namespace.
pub const DEFAULT_NAMESPACE: &str = "/ip-pool";

/// Key builder and decoder for one pool namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolKeys {
    available_prefix: String,
    taken_prefix: String,
}

impl PoolKeys {
    /// Build the layout for a namespace such as `/ip-pool`.
    ///
    /// A trailing `/` on the namespace is ignored.
    pub fn new(namespace: &str) -> Self {
        let namespace = namespace.trim_end_matches('/');
        Self {
            available_prefix: format!("{}/available/", namespace),
            taken_prefix: format!("{}/taken/", namespace),
        }
    }

    pub fn available_prefix(&self) -> &[u8] {
        self.available_prefix.as_bytes()
    }

    pub fn taken_prefix(&self) -> &[u8] {
        self.taken_prefix.as_bytes()
    }

    /// Key of the AvailabilityRecord for `addr`.
    pub fn available(&self, addr: &Address) -> Vec<u8> {
        format!("{}{}", self.available_prefix, addr).into_bytes()
    }

    /// Key of the TakenRecord for `addr`.
    pub fn taken(&self, addr: &Address) -> Vec<u8> {
        format!("{}{}", self.taken_prefix, addr).into_bytes()
    }

    /// Decode the address from an available-namespace key.
    pub fn decode_available(&self, key: &[u8]) -> Option<Address> {
        decode_suffix(key, self.available_prefix.as_bytes())
    }

    /// Decode the address from a taken-namespace key.
    pub fn decode_taken(&self, key: &[u8]) -> Option<Address> {
        decode_suffix(key, self.taken_prefix.as_bytes())
    }
}

impl Default for PoolKeys {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

/// Only the canonical text form decodes. Any other spelling names a key the
/// coordinator never writes, so its transactions could not match it.
fn decode_suffix(key: &[u8], prefix: &[u8]) -> Option<Address> {
    let suffix = std::str::from_utf8(key.strip_prefix(prefix)?).ok()?;
    let addr: Address = suffix.parse().ok()?;
    (addr.to_string() == suffix).then_some(addr)
}
