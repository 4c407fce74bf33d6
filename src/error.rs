//! Error handling for the minehound scanner
//!
//! Only request-level and orchestration-level problems are errors. Probe
//! failures (timeouts, refused connections, unreadable responses) are folded
//! into negative results by the components that observe them.

use thiserror::Error;

use crate::orchestrator::ScanStatus;

/// Main error type for scanning operations
#[derive(Debug, Error)]
pub enum ScanError {
    /// Malformed target specification. Fatal to the whole request.
    #[error("Invalid target range: {0}")]
    InvalidRange(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The orchestrator could not drive the pipeline (worker allocation,
    /// aggregation channel failure, ...).
    #[error("Orchestration failure: {0}")]
    Orchestration(String),

    #[error("Scan session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: ScanStatus, to: ScanStatus },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Timeout error")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Errors that terminate a scan session as `failed`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidRange(_) | ScanError::Config(_) | ScanError::Orchestration(_)
        )
    }
}

impl From<std::net::AddrParseError> for ScanError {
    fn from(e: std::net::AddrParseError) -> Self {
        ScanError::InvalidRange(e.to_string())
    }
}

impl From<ipnetwork::IpNetworkError> for ScanError {
    fn from(e: ipnetwork::IpNetworkError) -> Self {
        ScanError::InvalidRange(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ScanError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ScanError::Timeout
    }
}

impl From<toml::de::Error> for ScanError {
    fn from(e: toml::de::Error) -> Self {
        ScanError::Config(e.to_string())
    }
}
