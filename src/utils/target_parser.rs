//! Target parsing and host enumeration
//!
//! Turns a target specification (single address or CIDR network, IPv4 or
//! IPv6) into a lazy, ascending, restartable sequence of candidate hosts.
//! Network and broadcast addresses are skipped for anything wider than a
//! point-to-point link; for IPv6 only the subnet-router anycast address is
//! skipped since there is no broadcast.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::ScanError;

/// Type of target being scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetType {
    SingleIpv4,
    SingleIpv6,
    Ipv4Cidr,
    Ipv6Cidr,
}

/// A validated target specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRange {
    original: String,
    network: IpNetwork,
    target_type: TargetType,
}

impl AddressRange {
    /// Parse a target string: `a.b.c.d`, `a.b.c.d/n`, an IPv6 address or an IPv6 CIDR.
    ///
    /// Host bits set in a CIDR (`10.0.0.7/24`) are ignored; the range is the
    /// enclosing network, as with non-strict network parsing elsewhere.
    pub fn parse(spec: &str) -> crate::Result<Self> {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            return Err(ScanError::InvalidRange("target cannot be empty".to_string()));
        }

        let (network, target_type) = match trimmed.split_once('/') {
            None => {
                let ip = IpAddr::from_str(trimmed).map_err(|_| {
                    ScanError::InvalidRange(format!("not an IP address: '{}'", trimmed))
                })?;
                match ip {
                    IpAddr::V4(_) => (IpNetwork::new(ip, 32)?, TargetType::SingleIpv4),
                    IpAddr::V6(_) => (IpNetwork::new(ip, 128)?, TargetType::SingleIpv6),
                }
            }
            Some((addr, prefix)) => {
                let ip = IpAddr::from_str(addr.trim()).map_err(|_| {
                    ScanError::InvalidRange(format!("invalid network address in '{}'", trimmed))
                })?;
                let prefix: u8 = prefix.trim().parse().map_err(|_| {
                    ScanError::InvalidRange(format!("invalid prefix length in '{}'", trimmed))
                })?;
                let network = IpNetwork::new(ip, prefix)?;
                let network = IpNetwork::new(network.network(), prefix)?;
                let target_type = if network.is_ipv4() {
                    TargetType::Ipv4Cidr
                } else {
                    TargetType::Ipv6Cidr
                };
                (network, target_type)
            }
        };

        Ok(Self {
            original: trimmed.to_string(),
            network,
            target_type,
        })
    }

    /// The specification as the caller wrote it (trimmed)
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn network(&self) -> IpNetwork {
        self.network
    }

    pub fn target_type(&self) -> TargetType {
        self.target_type
    }

    pub fn is_single_host(&self) -> bool {
        matches!(self.target_type, TargetType::SingleIpv4 | TargetType::SingleIpv6)
    }

    /// Number of candidates `hosts()` will yield.
    pub fn host_count(&self) -> u128 {
        let (first, last) = self.bounds();
        last - first + 1
    }

    /// Reject ranges that would enumerate more than `max_hosts` candidates.
    pub fn ensure_within(&self, max_hosts: usize) -> crate::Result<usize> {
        let count = self.host_count();
        if count > max_hosts as u128 {
            return Err(ScanError::InvalidRange(format!(
                "{} expands to {} hosts (limit {})",
                self.original, count, max_hosts
            )));
        }
        Ok(count as usize)
    }

    /// Fresh iterator over the candidate hosts, in ascending numeric order.
    pub fn hosts(&self) -> HostIter {
        let (first, last) = self.bounds();
        HostIter {
            next: first,
            last,
            done: false,
            ipv6: !self.network.is_ipv4(),
        }
    }

    /// Inclusive numeric bounds of the usable host addresses.
    fn bounds(&self) -> (u128, u128) {
        match self.network {
            IpNetwork::V4(net) => {
                let base = u32::from(net.network()) as u128;
                let prefix = net.prefix();
                let size = 1u128 << (32 - prefix as u32);
                match prefix {
                    32 => (base, base),
                    31 => (base, base + 1),
                    _ => (base + 1, base + size - 2),
                }
            }
            IpNetwork::V6(net) => {
                let base = u128::from(net.network());
                let prefix = net.prefix();
                let last = if prefix == 0 {
                    u128::MAX
                } else {
                    base | (u128::MAX >> prefix as u32)
                };
                match prefix {
                    128 => (base, base),
                    127 => (base, last),
                    _ => (base + 1, last),
                }
            }
        }
    }
}

impl FromStr for AddressRange {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_host() {
            write!(f, "{}", self.network.ip())
        } else {
            write!(f, "{}", self.network)
        }
    }
}

impl<'a> IntoIterator for &'a AddressRange {
    type Item = IpAddr;
    type IntoIter = HostIter;

    fn into_iter(self) -> Self::IntoIter {
        self.hosts()
    }
}

/// Lazy iterator over candidate hosts of an [`AddressRange`]
#[derive(Debug, Clone)]
pub struct HostIter {
    next: u128,
    last: u128,
    done: bool,
    ipv6: bool,
}

impl Iterator for HostIter {
    type Item = IpAddr;

    fn next(&mut self) -> Option<IpAddr> {
        if self.done {
            return None;
        }

        let current = self.next;
        if current == self.last {
            self.done = true;
        } else {
            self.next += 1;
        }

        Some(if self.ipv6 {
            IpAddr::V6(Ipv6Addr::from(current))
        } else {
            IpAddr::V4(Ipv4Addr::from(current as u32))
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let remaining = self.last - self.next + 1;
        match usize::try_from(remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_ipv4() {
        let range = AddressRange::parse("192.168.1.10").unwrap();
        assert!(range.is_single_host());
        assert_eq!(range.target_type(), TargetType::SingleIpv4);
        let hosts: Vec<_> = range.hosts().collect();
        assert_eq!(hosts, vec!["192.168.1.10".parse::<IpAddr>().unwrap()]);
    }

    #[test]
    fn test_slash_30_excludes_network_and_broadcast() {
        let range = AddressRange::parse("198.51.100.0/30").unwrap();
        let hosts: Vec<String> = range.hosts().map(|ip| ip.to_string()).collect();
        assert_eq!(hosts, vec!["198.51.100.1", "198.51.100.2"]);
        assert_eq!(range.host_count(), 2);
    }

    #[test]
    fn test_slash_24_bounds() {
        let range = AddressRange::parse("10.0.0.0/24").unwrap();
        let hosts: Vec<_> = range.hosts().collect();
        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts[0].to_string(), "10.0.0.1");
        assert_eq!(hosts[253].to_string(), "10.0.0.254");
    }

    #[test]
    fn test_host_bits_are_normalised() {
        let range = AddressRange::parse("10.0.0.77/29").unwrap();
        let first = range.hosts().next().unwrap();
        assert_eq!(first.to_string(), "10.0.0.73");
        assert_eq!(range.host_count(), 6);
    }

    #[test]
    fn test_point_to_point_links() {
        let range = AddressRange::parse("10.1.1.0/31").unwrap();
        assert_eq!(range.hosts().count(), 2);
        let range = AddressRange::parse("10.1.1.9/32").unwrap();
        assert_eq!(range.hosts().count(), 1);
    }

    #[test]
    fn test_ipv6_range() {
        let range = AddressRange::parse("2001:db8::/126").unwrap();
        let hosts: Vec<String> = range.hosts().map(|ip| ip.to_string()).collect();
        assert_eq!(hosts, vec!["2001:db8::1", "2001:db8::2", "2001:db8::3"]);
    }

    #[test]
    fn test_iterator_is_restartable() {
        let range = AddressRange::parse("172.16.0.0/28").unwrap();
        let first: Vec<_> = range.hosts().collect();
        let second: Vec<_> = (&range).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(range.hosts().size_hint(), (14, Some(14)));
    }

    #[test]
    fn test_ascending_order() {
        let range = AddressRange::parse("10.9.8.0/27").unwrap();
        let hosts: Vec<_> = range.hosts().collect();
        assert!(hosts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_malformed_targets() {
        for bad in ["", "   ", "10.0.0.0/33", "300.1.1.1", "10.0.0.0/abc", "example", "10.0.0.0/"] {
            let err = AddressRange::parse(bad).unwrap_err();
            assert!(matches!(err, ScanError::InvalidRange(_)), "{:?} accepted", bad);
        }
    }

    #[test]
    fn test_size_limit() {
        let range = AddressRange::parse("10.0.0.0/8").unwrap();
        assert!(range.ensure_within(65_536).is_err());
        let range = AddressRange::parse("10.0.0.0/16").unwrap();
        assert_eq!(range.ensure_within(65_536).unwrap(), 65_534);
    }

    #[test]
    fn test_display() {
        assert_eq!(AddressRange::parse("10.0.0.5").unwrap().to_string(), "10.0.0.5");
        assert_eq!(AddressRange::parse(" 10.0.0.5/24 ").unwrap().to_string(), "10.0.0.0/24");
    }
}
