//! Port scanner engine

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

use super::OpenPortSet;
use crate::config::ScanConfig;
use crate::core::connector::{connect_timeout, Connector};

/// TCP connect scanner
///
/// Ports of one host are probed concurrently, at most `port_concurrency`
/// at a time; every open socket additionally holds a permit of the
/// scan-wide socket semaphore.
#[derive(Clone)]
pub struct PortScanner {
    connector: Arc<dyn Connector>,
    timeout: Duration,
    port_concurrency: usize,
    sockets: Arc<Semaphore>,
}

impl PortScanner {
    pub fn new(
        connector: Arc<dyn Connector>,
        timeout: Duration,
        port_concurrency: usize,
        sockets: Arc<Semaphore>,
    ) -> Self {
        Self {
            connector,
            timeout,
            port_concurrency: port_concurrency.max(1),
            sockets,
        }
    }

    pub fn from_config(
        config: &ScanConfig,
        connector: Arc<dyn Connector>,
        sockets: Arc<Semaphore>,
    ) -> Self {
        Self::new(
            connector,
            config.connect_timeout(),
            config.max_concurrent_ports,
            sockets,
        )
    }

    /// Probe every port in `ports` on `ip`
    ///
    /// The returned set has exactly one entry per distinct port requested.
    pub async fn scan_ports(&self, ip: IpAddr, ports: &[u16]) -> OpenPortSet {
        let host_slots = Arc::new(Semaphore::new(self.port_concurrency));
        let mut probes = FuturesUnordered::new();

        for &port in ports {
            let host_slots = host_slots.clone();
            probes.push(async move {
                let open = match host_slots.acquire_owned().await {
                    Ok(_permit) => self.probe_port(ip, port).await,
                    Err(_) => false,
                };
                (port, open)
            });
        }

        let mut result = OpenPortSet::new();
        while let Some((port, open)) = probes.next().await {
            result.record(port, open);
        }

        debug!(
            "{}: {}/{} ports open",
            ip,
            result.open_count(),
            result.len()
        );
        result
    }

    /// True iff a TCP handshake to `ip:port` completes within the timeout
    pub async fn probe_port(&self, ip: IpAddr, port: u16) -> bool {
        let _socket = match self.sockets.acquire().await {
            Ok(permit) => permit,
            Err(_) => return false,
        };

        let addr = SocketAddr::new(ip, port);
        match connect_timeout(self.connector.as_ref(), addr, self.timeout).await {
            Ok(mut stream) => {
                // simultaneous-open onto our own ephemeral port is not a service
                let is_self_connect = match (stream.local_addr(), stream.peer_addr()) {
                    (Ok(local), Ok(peer)) => local == peer,
                    _ => false,
                };
                let _ = stream.shutdown().await;
                !is_self_connect
            }
            Err(e) => {
                debug!("{} closed: {}", addr, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connector::TcpConnector;
    use tokio::net::TcpListener;

    fn scanner(port_concurrency: usize) -> PortScanner {
        PortScanner::new(
            Arc::new(TcpConnector),
            Duration::from_millis(500),
            port_concurrency,
            Arc::new(Semaphore::new(64)),
        )
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_open_and_closed_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap().port();
        let closed = closed_port().await;

        let result = scanner(4)
            .scan_ports("127.0.0.1".parse().unwrap(), &[open, closed])
            .await;

        assert_eq!(result.len(), 2);
        assert!(result.is_open(open));
        assert!(!result.is_open(closed));
    }

    #[tokio::test]
    async fn test_one_entry_per_port() {
        let mut listeners = Vec::new();
        let mut ports = Vec::new();
        for _ in 0..6 {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            ports.push(listener.local_addr().unwrap().port());
            listeners.push(listener);
        }

        let result = scanner(2).scan_ports("127.0.0.1".parse().unwrap(), &ports).await;
        assert_eq!(result.len(), 6);
        assert_eq!(result.open_count(), 6);
    }

    #[tokio::test]
    async fn test_closed_socket_pool_reports_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let sockets = Arc::new(Semaphore::new(1));
        sockets.close();
        let scanner = PortScanner::new(Arc::new(TcpConnector), Duration::from_millis(500), 1, sockets);
        assert!(!scanner.probe_port("127.0.0.1".parse().unwrap(), port).await);
    }
}
