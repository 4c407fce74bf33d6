//! Reachability probing
//!
//! Decides whether a candidate host is worth port scanning. Probes are tried
//! in order until one reports the host alive; every probe failure (timeout,
//! missing privileges, unreachable network) counts as "not alive".

pub mod engine;
pub mod methods;

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

pub use engine::ReachabilityProber;
pub use methods::{IcmpProbe, TcpProbe};

/// Discovery result for a single host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub target: IpAddr,
    pub is_alive: bool,
    pub response_time: Option<Duration>,
    pub method_used: String,
}

impl DiscoveryResult {
    pub fn new(target: IpAddr, is_alive: bool, method: &str) -> Self {
        Self {
            target,
            is_alive,
            response_time: None,
            method_used: method.to_string(),
        }
    }

    pub fn with_response_time(mut self, response_time: Duration) -> Self {
        self.response_time = Some(response_time);
        self
    }
}

/// A way of telling whether a host is up
#[async_trait::async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Probe `target`. Must not error and must finish within the probe's own timeout.
    async fn probe(&self, target: IpAddr) -> DiscoveryResult;
    fn method_name(&self) -> &str;
}
