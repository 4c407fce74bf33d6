//! Stratum handshake
//!
//! Sends `mining.subscribe`, then `mining.authorize`, reading and
//! classifying the reply to each before sending the next. The first reply
//! that looks like stratum ends the exchange.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;

use super::signatures;
use super::FingerprintResult;
use crate::config::ScanConfig;
use crate::core::connector::Connector;

/// Requests of the handshake, newline-delimited JSON-RPC
pub const STRATUM_REQUESTS: [&str; 2] = [
    "{\"id\": 1, \"method\": \"mining.subscribe\", \"params\": []}\n",
    "{\"id\": 1, \"method\": \"mining.authorize\", \"params\": [\"test\", \"test\"]}\n",
];

const READ_BUFFER: usize = 1024;

/// Stratum service fingerprinter
#[derive(Clone)]
pub struct Fingerprinter {
    connector: Arc<dyn Connector>,
    timeout: Duration,
    sockets: Arc<Semaphore>,
    excerpt_len: usize,
}

impl Fingerprinter {
    pub fn new(
        connector: Arc<dyn Connector>,
        timeout: Duration,
        sockets: Arc<Semaphore>,
        excerpt_len: usize,
    ) -> Self {
        Self {
            connector,
            timeout,
            sockets,
            excerpt_len,
        }
    }

    pub fn from_config(
        config: &ScanConfig,
        connector: Arc<dyn Connector>,
        sockets: Arc<Semaphore>,
    ) -> Self {
        Self::new(
            connector,
            config.fingerprint_timeout(),
            sockets,
            config.response_excerpt_len,
        )
    }

    /// Fingerprint `ip:port`. Any failure gives a negative result.
    ///
    /// The whole exchange (connect plus both round trips) is bounded by the
    /// fingerprint timeout.
    pub async fn fingerprint(&self, ip: IpAddr, port: u16) -> FingerprintResult {
        let _socket = match self.sockets.acquire().await {
            Ok(permit) => permit,
            Err(_) => return FingerprintResult::negative(port, None),
        };

        let addr = SocketAddr::new(ip, port);
        let mut last_response = None;
        let outcome =
            tokio::time::timeout(self.timeout, self.exchange(addr, &mut last_response)).await;

        match outcome {
            Ok(Ok(Some(response))) => self.classify(port, &response),
            Ok(Ok(None)) => FingerprintResult::negative(port, self.excerpt(last_response)),
            Ok(Err(e)) => {
                debug!("Stratum exchange with {} failed: {}", addr, e);
                FingerprintResult::negative(port, self.excerpt(last_response))
            }
            Err(_) => {
                debug!("Stratum exchange with {} timed out", addr);
                FingerprintResult::negative(port, self.excerpt(last_response))
            }
        }
    }

    /// Run the handshake; returns the first stratum-looking response
    async fn exchange(
        &self,
        addr: SocketAddr,
        last_response: &mut Option<String>,
    ) -> std::io::Result<Option<String>> {
        let mut stream = self.connector.connect(addr).await?;
        let mut buffer = [0u8; READ_BUFFER];

        for request in STRATUM_REQUESTS {
            stream.write_all(request.as_bytes()).await?;

            let len = stream.read(&mut buffer).await?;
            if len == 0 {
                break;
            }

            let response = String::from_utf8_lossy(&buffer[..len]).into_owned();
            if signatures::is_stratum_response(&response) {
                return Ok(Some(response));
            }
            *last_response = Some(response);
        }

        Ok(None)
    }

    fn classify(&self, port: u16, response: &str) -> FingerprintResult {
        let software = signatures::match_mining_software(response);
        debug!(
            "Stratum service on port {}{}",
            port,
            software.map(|s| format!(" ({})", s)).unwrap_or_default()
        );
        FingerprintResult::stratum(
            port,
            software.map(str::to_string),
            self.excerpt(Some(response.to_string())),
        )
    }

    /// Trim a response to at most `excerpt_len` characters
    fn excerpt(&self, response: Option<String>) -> Option<String> {
        let response = response?;
        let trimmed = response.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(trimmed.chars().take(self.excerpt_len).collect())
    }
}
