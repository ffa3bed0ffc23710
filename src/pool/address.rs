//! Fixed-width host addresses and the CIDR block they are drawn from.
//!
//! Addresses compare as byte arrays, never as text. IPv4 addresses are
//! compared in their IPv4-mapped 16-byte form so that a mixed set still has a
//! total order, but a pool only ever holds one family.

use crate::core::error::{PoolError, PoolResult};
use ipnet::IpNet;
use std::cmp::Ordering;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// A host address as a fixed-width big-endian byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    V4([u8; 4]),
    V6([u8; 16]),
}

impl Address {
    /// Raw address bytes (4 or 16).
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::V4(b) => b,
            Self::V6(b) => b,
        }
    }

    /// Width in bytes.
    pub fn width(&self) -> usize {
        self.as_bytes().len()
    }

    /// 16-byte form used for ordering.
    fn canonical(&self) -> [u8; 16] {
        match self {
            Self::V4(b) => Ipv4Addr::from(*b).to_ipv6_mapped().octets(),
            Self::V6(b) => *b,
        }
    }

    /// The next address, carrying from the last byte into preceding bytes.
    ///
    /// Returns `None` when every byte overflows.
    pub fn successor(&self) -> Option<Address> {
        let mut next = *self;
        let carried_out = match &mut next {
            Self::V4(b) => increment_be(b),
            Self::V6(b) => increment_be(b),
        };
        (!carried_out).then_some(next)
    }

    /// Convert to a standard library address.
    pub fn to_ip(&self) -> IpAddr {
        match self {
            Self::V4(b) => IpAddr::V4(Ipv4Addr::from(*b)),
            Self::V6(b) => IpAddr::V6(Ipv6Addr::from(*b)),
        }
    }
}

/// Big-endian increment in place. Returns true if the carry ran off the front.
fn increment_be(bytes: &mut [u8]) -> bool {
    for byte in bytes.iter_mut().rev() {
        let (value, overflowed) = byte.overflowing_add(1);
        *byte = value;
        if !overflowed {
            return false;
        }
    }
    true
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical()
            .cmp(&other.canonical())
            .then_with(|| self.width().cmp(&other.width()))
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<IpAddr> for Address {
    fn from(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Self::V4(v4.octets()),
            IpAddr::V6(v6) => Self::V6(v6.octets()),
        }
    }
}

impl From<Ipv4Addr> for Address {
    fn from(ip: Ipv4Addr) -> Self {
        Self::V4(ip.octets())
    }
}

impl From<Address> for IpAddr {
    fn from(addr: Address) -> Self {
        addr.to_ip()
    }
}

impl FromStr for Address {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IpAddr::from_str(s).map(Address::from)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_ip().fmt(f)
    }
}

/// A flat CIDR block.
///
/// The base is the network address of the block; host bits in the input are
/// discarded. The first two addresses (network and gateway) are never handed
/// out; every other address up to and including the last one in the block is
/// usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpace {
    net: IpNet,
}

impl AddressSpace {
    /// Parse a CIDR string such as `10.0.0.0/24`.
    pub fn parse(cidr: &str) -> PoolResult<Self> {
        let net: IpNet = cidr
            .trim()
            .parse()
            .map_err(|e: ipnet::AddrParseError| PoolError::invalid_cidr(cidr, e.to_string()))?;
        Ok(Self { net: net.trunc() })
    }

    /// Network (base) address.
    pub fn base(&self) -> Address {
        self.net.network().into()
    }

    /// Last address in the block.
    pub fn last(&self) -> Address {
        self.net.broadcast().into()
    }

    /// Prefix length.
    pub fn prefix_len(&self) -> u8 {
        self.net.prefix_len()
    }

    /// First address handed out (base + 2), if the block has one.
    pub fn first_usable(&self) -> Option<Address> {
        let first = self.base().successor()?.successor()?;
        self.contains(&first).then_some(first)
    }

    /// Check subnet membership.
    pub fn contains(&self, addr: &Address) -> bool {
        self.net.contains(&addr.to_ip())
    }

    /// Number of usable addresses. Saturates for `::/0`.
    pub fn usable_count(&self) -> u128 {
        let host_bits = u32::from(self.net.max_prefix_len() - self.net.prefix_len());
        let total = 1u128.checked_shl(host_bits).unwrap_or(u128::MAX);
        total.saturating_sub(2)
    }

    /// Iterate the usable addresses in ascending order.
    pub fn usable(&self) -> UsableAddresses {
        UsableAddresses {
            next: self.first_usable(),
            last: self.last(),
        }
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.net.fmt(f)
    }
}

impl FromStr for AddressSpace {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Iterator over the usable addresses of an [`AddressSpace`].
#[derive(Debug, Clone)]
pub struct UsableAddresses {
    next: Option<Address>,
    last: Address,
}

impl Iterator for UsableAddresses {
    type Item = Address;

    fn next(&mut self) -> Option<Address> {
        let current = self.next?;
        self.next = if current == self.last {
            None
        } else {
            current.successor()
        };
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn test_byte_order_not_text_order() {
        assert!(addr("10.0.0.9") < addr("10.0.0.10"));
        assert!(addr("10.0.0.255") < addr("10.0.1.0"));
        assert!(addr("9.255.255.255") < addr("10.0.0.0"));
    }

    #[test]
    fn test_successor_carries_across_octets() {
        assert_eq!(addr("10.0.0.255").successor(), Some(addr("10.0.1.0")));
        assert_eq!(addr("10.0.255.255").successor(), Some(addr("10.1.0.0")));
        assert_eq!(addr("255.255.255.255").successor(), None);
        assert_eq!(addr("::ffff").successor(), Some(addr("::1:0")));
    }

    #[test]
    fn test_parse_discards_host_bits() {
        let space = AddressSpace::parse("10.0.0.77/24").unwrap();
        assert_eq!(space.base(), addr("10.0.0.0"));
        assert_eq!(space.first_usable(), Some(addr("10.0.0.2")));
        assert_eq!(space.last(), addr("10.0.0.255"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "10.0.0.0", "10.0.0.0/33", "not-a-cidr", "10.0.0/24"] {
            let err = AddressSpace::parse(bad).unwrap_err();
            assert!(matches!(err, PoolError::InvalidCidr { .. }), "{bad}");
        }
    }

    #[test]
    fn test_tiny_blocks_have_no_usable_hosts() {
        assert_eq!(AddressSpace::parse("10.0.0.0/31").unwrap().first_usable(), None);
        assert_eq!(AddressSpace::parse("10.0.0.7/32").unwrap().first_usable(), None);
        assert_eq!(AddressSpace::parse("10.0.0.0/31").unwrap().usable().count(), 0);
    }

    #[test]
    fn test_usable_iteration() {
        let space = AddressSpace::parse("192.168.1.0/30").unwrap();
        let all: Vec<_> = space.usable().collect();
        assert_eq!(all, vec![addr("192.168.1.2"), addr("192.168.1.3")]);
        assert_eq!(space.usable_count(), 2);
    }

    #[test]
    fn test_contains() {
        let space = AddressSpace::parse("10.0.0.0/24").unwrap();
        assert!(space.contains(&addr("10.0.0.200")));
        assert!(!space.contains(&addr("10.0.1.0")));
        assert!(!space.contains(&addr("::1")));
    }

    #[test]
    fn test_ipv6_block() {
        let space = AddressSpace::parse("fd00::/126").unwrap();
        let all: Vec<_> = space.usable().collect();
        assert_eq!(all, vec![addr("fd00::2"), addr("fd00::3")]);
        assert_eq!(
            AddressSpace::parse("::/0").unwrap().usable_count(),
            u128::MAX - 2
        );
    }
}
