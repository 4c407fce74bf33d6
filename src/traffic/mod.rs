//! Traffic-pattern evidence
//!
//! A snapshot of the local connection table is taken once per scan run and
//! consulted for every scanned host. Two patterns count: an established
//! connection to the host on a mining-table port, and a reverse hostname
//! inside a known pool domain. Each pattern counts at most once per host.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;

use crate::fingerprint::signatures;
use crate::mining_ports;
use crate::network::connections::{self, Connection};
use crate::scoring::Evidence;

/// Source of established TCP connections
#[async_trait]
pub trait ConnectionTable: Send + Sync {
    async fn established(&self) -> Vec<Connection>;
}

/// `netstat -tn` backed connection table
#[derive(Debug, Clone)]
pub struct NetstatTable {
    timeout: Duration,
}

impl NetstatTable {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ConnectionTable for NetstatTable {
    async fn established(&self) -> Vec<Connection> {
        connections::established_connections(self.timeout).await
    }
}

/// Empty table, used when traffic analysis is switched off
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTraffic;

#[async_trait]
impl ConnectionTable for NoTraffic {
    async fn established(&self) -> Vec<Connection> {
        Vec::new()
    }
}

/// Connection table captured at the start of a scan run
#[derive(Debug, Clone, Default)]
pub struct TrafficSnapshot {
    connections: Vec<Connection>,
}

impl TrafficSnapshot {
    pub async fn capture(table: &dyn ConnectionTable) -> Self {
        let connections = table.established().await;
        log::debug!("Captured {} established connections", connections.len());
        Self { connections }
    }

    pub fn from_connections(connections: Vec<Connection>) -> Self {
        Self { connections }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Traffic evidence for `address`
    pub fn evidence_for(&self, address: IpAddr, hostname: Option<&str>) -> Vec<Evidence> {
        let mut evidence = Vec::new();

        if let Some(conn) = self.connections.iter().find(|conn| {
            conn.remote.ip() == address && mining_ports::is_mining_port(conn.remote.port())
        }) {
            evidence.push(Evidence::mining_port_traffic(conn.remote));
        }

        if let Some(hostname) = hostname {
            if let Some(domain) = signatures::match_pool_domain(hostname) {
                evidence.push(Evidence::pool_domain_traffic(hostname, domain));
            }
        }

        evidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::EvidenceKind;

    fn conn(local: &str, remote: &str) -> Connection {
        Connection {
            local: local.parse().unwrap(),
            remote: remote.parse().unwrap(),
        }
    }

    #[test]
    fn test_mining_port_connection_counts_once() {
        let snapshot = TrafficSnapshot::from_connections(vec![
            conn("10.0.0.2:50001", "198.51.100.1:3333"),
            conn("10.0.0.2:50002", "198.51.100.1:4444"),
            conn("10.0.0.2:50003", "198.51.100.9:3333"),
        ]);

        let evidence = snapshot.evidence_for("198.51.100.1".parse().unwrap(), None);
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].kind(), EvidenceKind::TrafficPattern);
        assert_eq!(evidence[0].weight(), 25);
    }

    #[test]
    fn test_non_mining_port_ignored() {
        let snapshot =
            TrafficSnapshot::from_connections(vec![conn("10.0.0.2:50001", "198.51.100.1:443")]);
        assert!(snapshot.evidence_for("198.51.100.1".parse().unwrap(), None).is_empty());
    }

    #[test]
    fn test_pool_domain_hostname() {
        let snapshot = TrafficSnapshot::default();
        let evidence =
            snapshot.evidence_for("198.51.100.1".parse().unwrap(), Some("xmr-eu1.nanopool.org"));
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].weight(), 20);
    }

    #[tokio::test]
    async fn test_disabled_table_is_empty() {
        assert!(TrafficSnapshot::capture(&NoTraffic).await.is_empty());
    }
}
