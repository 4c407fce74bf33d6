//! Minehound - finds the miners hiding on your network
//!
//! Sweeps an address range for reachable hosts, probes the ports that mining
//! software and pools listen on, speaks enough stratum to tell a pool from a
//! web server, and scores every host by the evidence it leaves behind.

pub mod config;
pub mod core;
pub mod discovery;
pub mod error;
pub mod fingerprint;
pub mod mining_ports;
pub mod network;
pub mod orchestrator;
pub mod output;
pub mod scanner;
pub mod scoring;
pub mod sensor;
pub mod traffic;
pub mod utils;

// Re-export commonly used types
pub use config::ScanConfig;
pub use crate::core::connector::{Connector, TcpConnector};
pub use discovery::{LivenessProbe, ReachabilityProber};
pub use error::ScanError;
pub use fingerprint::{FingerprintResult, Fingerprinter};
pub use orchestrator::{
    ScanHandle, ScanOrchestrator, ScanRequest, ScanResult, ScanSession, ScanStatus, ScanSummary,
};
pub use scanner::{OpenPortSet, PortScanner};
pub use scoring::{DetectedHost, Evidence, EvidenceKind, ScoringEngine, ThreatLevel};
pub use utils::target_parser::AddressRange;

pub type Result<T> = std::result::Result<T, ScanError>;
