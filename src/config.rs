//! Configuration module for the minehound scanner

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::mining_ports;
use crate::ScanError;

/// Main configuration structure for detection scans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// ICMP echo timeout per host in milliseconds
    pub ping_timeout_ms: u64,

    /// TCP connect timeout per port in milliseconds
    pub connect_timeout_ms: u64,

    /// Upper bound for one stratum exchange (connect plus both requests)
    pub fingerprint_timeout_ms: u64,

    /// Reverse DNS and neighbour-table lookup timeout
    pub dns_timeout_ms: u64,

    /// Hosts processed concurrently (outer pool)
    pub max_concurrent_hosts: usize,

    /// Ports probed concurrently within one host (inner pool)
    pub max_concurrent_ports: usize,

    /// TCP sockets open at once across the whole scan (port scan, fingerprint
    /// and fallback liveness connects)
    pub max_in_flight_sockets: usize,

    /// Fall back to TCP connects when ICMP gets no reply
    pub tcp_fallback: bool,

    /// Ports used by the TCP fallback probe
    pub tcp_fallback_ports: Vec<u16>,

    /// Largest range a single request may enumerate
    pub max_hosts: usize,

    /// Maximum characters of a service response kept in a fingerprint
    pub response_excerpt_len: usize,

    /// Inspect the local connection table for mining traffic
    pub traffic_analysis: bool,

    /// Port override; `None` scans the full mining port table
    pub ports: Option<Vec<u16>>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ping_timeout_ms: 1000,
            connect_timeout_ms: 2000,
            fingerprint_timeout_ms: 5000,
            dns_timeout_ms: 2000,
            max_concurrent_hosts: 64,
            max_concurrent_ports: 16,
            max_in_flight_sockets: 512,
            tcp_fallback: true,
            tcp_fallback_ports: vec![80, 443, 22, 4028, 3333],
            max_hosts: 65_536,
            response_excerpt_len: 256,
            traffic_analysis: true,
            ports: None,
        }
    }
}

impl ScanConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ports to scan instead of the mining table
    pub fn with_ports(mut self, ports: Vec<u16>) -> Self {
        self.ports = Some(ports);
        self
    }

    pub fn with_ping_timeout(mut self, ms: u64) -> Self {
        self.ping_timeout_ms = ms;
        self
    }

    pub fn with_connect_timeout(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    pub fn with_fingerprint_timeout(mut self, ms: u64) -> Self {
        self.fingerprint_timeout_ms = ms;
        self
    }

    pub fn with_dns_timeout(mut self, ms: u64) -> Self {
        self.dns_timeout_ms = ms;
        self
    }

    /// Set the outer (per-host) pool size
    pub fn with_host_concurrency(mut self, hosts: usize) -> Self {
        self.max_concurrent_hosts = hosts;
        self
    }

    /// Set the inner (per-port) pool size
    pub fn with_port_concurrency(mut self, ports: usize) -> Self {
        self.max_concurrent_ports = ports;
        self
    }

    pub fn with_max_sockets(mut self, sockets: usize) -> Self {
        self.max_in_flight_sockets = sockets;
        self
    }

    pub fn with_tcp_fallback(mut self, enabled: bool) -> Self {
        self.tcp_fallback = enabled;
        self
    }

    pub fn with_traffic_analysis(mut self, enabled: bool) -> Self {
        self.traffic_analysis = enabled;
        self
    }

    pub fn with_max_hosts(mut self, max_hosts: usize) -> Self {
        self.max_hosts = max_hosts;
        self
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn fingerprint_timeout(&self) -> Duration {
        Duration::from_millis(self.fingerprint_timeout_ms)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    /// Ports a scan will probe: the override if set, otherwise the mining table
    pub fn effective_ports(&self) -> Vec<u16> {
        match &self.ports {
            Some(ports) => {
                let mut ports = ports.clone();
                ports.sort_unstable();
                ports.dedup();
                ports
            }
            None => mining_ports::default_ports(),
        }
    }

    /// Load configuration from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ScanError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: ScanConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load_default_config() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let config_path = home_dir.join(".minehound.toml");

        if config_path.exists() {
            match Self::from_toml_file(&config_path) {
                Ok(config) => {
                    log::info!("Loaded config from {}", config_path.display());
                    return config;
                }
                Err(e) => log::warn!("Ignoring {}: {}", config_path.display(), e),
            }
        }

        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        let timeouts = [
            ("ping_timeout_ms", self.ping_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("fingerprint_timeout_ms", self.fingerprint_timeout_ms),
            ("dns_timeout_ms", self.dns_timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ScanError::Config(format!("{} must be greater than 0", name)));
            }
        }

        let pools = [
            ("max_concurrent_hosts", self.max_concurrent_hosts),
            ("max_concurrent_ports", self.max_concurrent_ports),
            ("max_in_flight_sockets", self.max_in_flight_sockets),
            ("max_hosts", self.max_hosts),
        ];
        for (name, value) in pools {
            if value == 0 {
                return Err(ScanError::Config(format!("{} must be greater than 0", name)));
            }
        }

        if let Some(ports) = &self.ports {
            if ports.is_empty() {
                return Err(ScanError::Config("No ports specified".to_string()));
            }
            if ports.contains(&0) {
                return Err(ScanError::Config("Port 0 cannot be scanned".to_string()));
            }
        }

        if self.tcp_fallback && self.tcp_fallback_ports.is_empty() {
            return Err(ScanError::Config(
                "tcp_fallback is enabled but tcp_fallback_ports is empty".to_string(),
            ));
        }

        Ok(())
    }
}
