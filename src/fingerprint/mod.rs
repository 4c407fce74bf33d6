//! Service fingerprinting
//!
//! Confirms whether an open port speaks the stratum mining protocol and,
//! when it does, which mining software answered. Also resolves the host
//! details (MAC, hostname) that go into a detection report.

pub mod host_info;
pub mod signatures;
pub mod stratum;

use serde::{Deserialize, Serialize};

pub use host_info::{HostInfo, HostInfoResolver, SystemResolver};
pub use stratum::Fingerprinter;

/// Outcome of fingerprinting one port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintResult {
    pub port: u16,
    pub is_stratum: bool,
    /// Protocol that confirmed the service, `"stratum"` when positive
    pub method: Option<String>,
    pub mining_software: Option<String>,
    /// Start of the service's reply, bounded in length
    pub response_excerpt: Option<String>,
}

impl FingerprintResult {
    pub fn stratum(port: u16, mining_software: Option<String>, excerpt: Option<String>) -> Self {
        Self {
            port,
            is_stratum: true,
            method: Some("stratum".to_string()),
            mining_software,
            response_excerpt: excerpt,
        }
    }

    pub fn negative(port: u16, excerpt: Option<String>) -> Self {
        Self {
            port,
            is_stratum: false,
            method: None,
            mining_software: None,
            response_excerpt: excerpt,
        }
    }
}
