//! TCP connect seam
//!
//! The port scanner and the fingerprinter never call `TcpStream::connect`
//! directly; they go through a [`Connector`]. Production code uses
//! [`TcpConnector`], tests swap in connectors that redirect documentation
//! addresses to loopback listeners.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

/// Opens TCP connections on behalf of the scanner and fingerprinter
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `addr`. No timeout is applied here; callers bound the attempt.
    async fn connect(&self, addr: SocketAddr) -> io::Result<TcpStream>;
}

/// Plain tokio TCP connector
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        TcpStream::connect(addr).await
    }
}

/// Connect through `connector`, giving up after `timeout`.
///
/// An elapsed timer is reported as `ErrorKind::TimedOut`.
pub async fn connect_timeout(
    connector: &dyn Connector,
    addr: SocketAddr,
    timeout: Duration,
) -> io::Result<TcpStream> {
    match tokio::time::timeout(timeout, connector.connect(addr)).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect to {} timed out after {:?}", addr, timeout),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connects_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let stream = connect_timeout(&TcpConnector, addr, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn test_refused_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect_timeout(&TcpConnector, addr, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    struct Stalling;

    #[async_trait]
    impl Connector for Stalling {
        async fn connect(&self, _addr: SocketAddr) -> io::Result<TcpStream> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timed_out() {
        let addr: SocketAddr = "198.51.100.7:3333".parse().unwrap();
        let err = connect_timeout(&Stalling, addr, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
