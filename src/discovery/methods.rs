//! Liveness probe implementations

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use log::debug;
use tokio::sync::Semaphore;

use super::{DiscoveryResult, LivenessProbe};
use crate::core::connector::{connect_timeout, Connector};
use crate::network::icmp;

/// ICMP echo request probe
#[derive(Debug, Clone)]
pub struct IcmpProbe {
    timeout: Duration,
}

impl IcmpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait::async_trait]
impl LivenessProbe for IcmpProbe {
    async fn probe(&self, target: IpAddr) -> DiscoveryResult {
        let result = icmp::ping_host(target, self.timeout).await;
        match result.rtt {
            Some(rtt) if result.success => {
                DiscoveryResult::new(target, true, self.method_name()).with_response_time(rtt)
            }
            _ => {
                if let Some(error) = &result.error {
                    debug!("ICMP probe of {}: {}", target, error);
                }
                DiscoveryResult::new(target, false, self.method_name())
            }
        }
    }

    fn method_name(&self) -> &str {
        "icmp-echo"
    }
}

/// TCP connect probe for hosts that drop ICMP
///
/// A completed handshake or an active refusal (RST) both prove the host is up.
pub struct TcpProbe {
    ports: Vec<u16>,
    timeout: Duration,
    connector: Arc<dyn Connector>,
    sockets: Arc<Semaphore>,
}

impl TcpProbe {
    /// Every connect holds a permit from `sockets`, the scan-wide socket budget
    pub fn new(
        ports: Vec<u16>,
        timeout: Duration,
        connector: Arc<dyn Connector>,
        sockets: Arc<Semaphore>,
    ) -> Self {
        Self {
            ports,
            timeout,
            connector,
            sockets,
        }
    }
}

#[async_trait::async_trait]
impl LivenessProbe for TcpProbe {
    async fn probe(&self, target: IpAddr) -> DiscoveryResult {
        let start = Instant::now();
        let mut attempts = FuturesUnordered::new();

        for &port in &self.ports {
            let addr = SocketAddr::new(target, port);
            let connector = self.connector.as_ref();
            let sockets = self.sockets.as_ref();
            let timeout = self.timeout;
            attempts.push(async move {
                let _socket = sockets
                    .acquire()
                    .await
                    .map_err(|_| std::io::Error::new(ErrorKind::Other, "socket pool closed"))?;
                connect_timeout(connector, addr, timeout).await
            });
        }

        while let Some(result) = attempts.next().await {
            match result {
                Ok(stream) => {
                    drop(stream);
                    return DiscoveryResult::new(target, true, self.method_name())
                        .with_response_time(start.elapsed());
                }
                Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                    return DiscoveryResult::new(target, true, self.method_name())
                        .with_response_time(start.elapsed());
                }
                Err(_) => {}
            }
        }

        DiscoveryResult::new(target, false, self.method_name())
    }

    fn method_name(&self) -> &str {
        "tcp-connect"
    }
}
