//! Host details for detection reports

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::network::{dns, neighbor};

/// MAC address and reverse hostname of a host, each optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub mac: Option<String>,
    pub hostname: Option<String>,
}

/// Looks up [`HostInfo`] for an address. Lookups never fail; missing data is `None`.
#[async_trait]
pub trait HostInfoResolver: Send + Sync {
    async fn resolve(&self, ip: IpAddr) -> HostInfo;
}

/// Neighbour table plus system resolver
#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl HostInfoResolver for SystemResolver {
    async fn resolve(&self, ip: IpAddr) -> HostInfo {
        let (mac, hostname) = tokio::join!(
            neighbor::lookup_mac(ip, self.timeout),
            dns::reverse_lookup(ip, self.timeout)
        );
        HostInfo { mac, hostname }
    }
}

/// Resolver that knows nothing, for offline scans and tests
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

#[async_trait]
impl HostInfoResolver for NoLookup {
    async fn resolve(&self, _ip: IpAddr) -> HostInfo {
        HostInfo::default()
    }
}
