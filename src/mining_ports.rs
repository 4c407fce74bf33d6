//! Mining-relevant port table
//!
//! Miner management APIs, stratum pool ports, miner web panels, the proxies
//! miners are commonly tunnelled through, coin node RPC/P2P ports and mail
//! ports used by mining botnets for reporting.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Port and service label, in scan order
pub const MINING_PORTS: &[(u16, &str)] = &[
    (4028, "CGMiner API"),
    (4029, "SGMiner API"),
    (4030, "BFGMiner API"),
    (3333, "Stratum Pool"),
    (4444, "Stratum Pool Alt"),
    (5555, "Stratum Pool"),
    (7777, "Stratum Pool"),
    (8080, "Web Interface"),
    (8888, "Web Interface Alt"),
    (9999, "Stratum SSL"),
    (14444, "Stratum SSL Alt"),
    (1080, "SOCKS Proxy"),
    (3128, "HTTP Proxy"),
    (8118, "Privoxy"),
    (9050, "Tor SOCKS"),
    (8332, "Bitcoin RPC"),
    (8333, "Bitcoin P2P"),
    (9332, "Litecoin RPC"),
    (25, "SMTP"),
    (587, "SMTP TLS"),
    (465, "SMTP SSL"),
];

static LABELS: Lazy<HashMap<u16, &'static str>> =
    Lazy::new(|| MINING_PORTS.iter().copied().collect());

/// Service label for a port in the table
pub fn service_label(port: u16) -> Option<&'static str> {
    LABELS.get(&port).copied()
}

pub fn is_mining_port(port: u16) -> bool {
    LABELS.contains_key(&port)
}

/// Every port in the table, sorted ascending
pub fn default_ports() -> Vec<u16> {
    let mut ports: Vec<u16> = MINING_PORTS.iter().map(|(port, _)| *port).collect();
    ports.sort_unstable();
    ports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_no_duplicates() {
        let ports = default_ports();
        let mut deduped = ports.clone();
        deduped.dedup();
        assert_eq!(ports.len(), deduped.len());
        assert_eq!(ports.len(), 21);
    }

    #[test]
    fn test_labels() {
        assert_eq!(service_label(4028), Some("CGMiner API"));
        assert_eq!(service_label(3333), Some("Stratum Pool"));
        assert_eq!(service_label(22), None);
        assert!(is_mining_port(14444));
        assert!(!is_mining_port(443));
    }
}
