//! Evidence scoring and threat classification
//!
//! Every observation about a host becomes an [`Evidence`] item with a fixed
//! weight. The confidence score is the capped sum of those weights, and the
//! threat level follows from the score by fixed thresholds. Hosts at or
//! below the reporting threshold are dropped.

pub mod evidence;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use crate::fingerprint::signatures;
use crate::fingerprint::{FingerprintResult, HostInfo};
use crate::mining_ports;
use crate::scanner::OpenPortSet;

pub use evidence::{Evidence, EvidenceKind, TrafficSignal};

/// Highest possible confidence score
pub const MAX_SCORE: u8 = 100;

/// Hosts scoring at or below this are not reported
pub const REPORTING_THRESHOLD: u8 = 15;

/// Threat tier derived from the confidence score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    /// Thresholds are checked high to low; the first match wins
    pub fn from_score(score: u8) -> Self {
        match score {
            70.. => ThreatLevel::Critical,
            50..=69 => ThreatLevel::High,
            30..=49 => ThreatLevel::Medium,
            _ => ThreatLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything gathered about one host, before scoring
#[derive(Debug, Clone)]
pub struct HostObservation {
    pub address: IpAddr,
    pub host_info: HostInfo,
    pub open_ports: OpenPortSet,
    pub fingerprints: Vec<FingerprintResult>,
    /// Traffic evidence; items of any other kind are ignored
    pub traffic: Vec<Evidence>,
    /// External sensor evidence; items of any other kind are ignored
    pub sensor: Vec<Evidence>,
}

impl HostObservation {
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            host_info: HostInfo::default(),
            open_ports: OpenPortSet::new(),
            fingerprints: Vec::new(),
            traffic: Vec::new(),
            sensor: Vec::new(),
        }
    }
}

/// A host that passed the reporting threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedHost {
    pub address: IpAddr,
    pub mac: Option<String>,
    pub hostname: Option<String>,
    pub open_ports: OpenPortSet,
    /// Service label per open port
    pub services: BTreeMap<u16, String>,
    pub fingerprints: Vec<FingerprintResult>,
    pub evidence: Vec<Evidence>,
    /// Human-readable description of each evidence item
    pub indicators: Vec<String>,
    pub confidence: u8,
    pub threat_level: ThreatLevel,
}

/// Scoring and classification engine
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    /// Turn an observation into the evidence list that gets scored
    pub fn collect_evidence(&self, observation: &HostObservation) -> Vec<Evidence> {
        let mut evidence = Vec::new();

        for port in observation.open_ports.open_ports() {
            if mining_ports::is_mining_port(port) {
                evidence.push(Evidence::open_port(port));
            }
        }

        if let Some(hostname) = &observation.host_info.hostname {
            if let Some(keyword) = signatures::match_hostname_keyword(hostname) {
                evidence.push(Evidence::hostname_keyword(hostname, keyword));
            }
        }

        for fingerprint in observation.fingerprints.iter().filter(|f| f.is_stratum) {
            evidence.push(Evidence::stratum_protocol(fingerprint.port));
            if let Some(software) = &fingerprint.mining_software {
                evidence.push(Evidence::mining_software(fingerprint.port, software));
            }
        }

        evidence.extend(
            observation
                .traffic
                .iter()
                .filter(|e| e.kind() == EvidenceKind::TrafficPattern)
                .cloned(),
        );
        evidence.extend(
            observation
                .sensor
                .iter()
                .filter(|e| e.kind() == EvidenceKind::ExternalSensor)
                .cloned(),
        );

        evidence
    }

    /// Sum of evidence weights, capped at [`MAX_SCORE`]
    pub fn score(&self, evidence: &[Evidence]) -> u8 {
        let total: u32 = evidence.iter().map(|e| e.weight() as u32).sum();
        total.min(MAX_SCORE as u32) as u8
    }

    pub fn classify(&self, score: u8) -> ThreatLevel {
        ThreatLevel::from_score(score)
    }

    pub fn is_reportable(&self, score: u8) -> bool {
        score > REPORTING_THRESHOLD
    }

    /// Score an observation; `None` if the host stays below the reporting threshold
    pub fn assess(&self, observation: HostObservation) -> Option<DetectedHost> {
        let evidence = self.collect_evidence(&observation);
        let confidence = self.score(&evidence);
        if !self.is_reportable(confidence) {
            return None;
        }

        let HostObservation {
            address,
            host_info,
            open_ports,
            fingerprints,
            ..
        } = observation;

        Some(DetectedHost {
            address,
            mac: host_info.mac,
            hostname: host_info.hostname,
            services: open_ports.services(),
            open_ports,
            fingerprints,
            indicators: evidence.iter().map(|e| e.detail().to_string()).collect(),
            evidence,
            confidence,
            threat_level: ThreatLevel::from_score(confidence),
        })
    }
}
