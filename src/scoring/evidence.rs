//! Evidence items and their fixed weights

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

use crate::mining_ports;

pub const OPEN_PORT_WEIGHT: u8 = 20;
pub const HOSTNAME_KEYWORD_WEIGHT: u8 = 30;
pub const STRATUM_PROTOCOL_WEIGHT: u8 = 40;
pub const MINING_SOFTWARE_WEIGHT: u8 = 30;
pub const MINING_PORT_TRAFFIC_WEIGHT: u8 = 25;
pub const POOL_DOMAIN_TRAFFIC_WEIGHT: u8 = 20;
pub const EXTERNAL_SENSOR_WEIGHT: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    OpenPort,
    HostnameKeyword,
    StratumProtocol,
    MiningSoftware,
    TrafficPattern,
    ExternalSensor,
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::OpenPort => "open_port",
            EvidenceKind::HostnameKeyword => "hostname_keyword",
            EvidenceKind::StratumProtocol => "stratum_protocol",
            EvidenceKind::MiningSoftware => "mining_software",
            EvidenceKind::TrafficPattern => "traffic_pattern",
            EvidenceKind::ExternalSensor => "external_sensor",
        }
    }
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which traffic signal a `traffic_pattern` item stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficSignal {
    MiningPort,
    PoolDomain,
}

/// Fixed weight of an evidence item
pub fn weight_of(kind: EvidenceKind, traffic: Option<TrafficSignal>) -> Option<u8> {
    match (kind, traffic) {
        (EvidenceKind::OpenPort, None) => Some(OPEN_PORT_WEIGHT),
        (EvidenceKind::HostnameKeyword, None) => Some(HOSTNAME_KEYWORD_WEIGHT),
        (EvidenceKind::StratumProtocol, None) => Some(STRATUM_PROTOCOL_WEIGHT),
        (EvidenceKind::MiningSoftware, None) => Some(MINING_SOFTWARE_WEIGHT),
        (EvidenceKind::TrafficPattern, Some(TrafficSignal::MiningPort)) => {
            Some(MINING_PORT_TRAFFIC_WEIGHT)
        }
        (EvidenceKind::TrafficPattern, Some(TrafficSignal::PoolDomain)) => {
            Some(POOL_DOMAIN_TRAFFIC_WEIGHT)
        }
        (EvidenceKind::ExternalSensor, None) => Some(EXTERNAL_SENSOR_WEIGHT),
        _ => None,
    }
}

/// One scored observation about a host
///
/// The weight always follows from the kind (and traffic signal). A
/// serialized `weight` is output only; loading recomputes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EvidenceRecord")]
pub struct Evidence {
    kind: EvidenceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    traffic: Option<TrafficSignal>,
    weight: u8,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
}

/// Wire shape of `Evidence`; any `weight` on the wire is ignored
#[derive(Deserialize)]
struct EvidenceRecord {
    kind: EvidenceKind,
    #[serde(default)]
    traffic: Option<TrafficSignal>,
    detail: String,
    #[serde(default)]
    port: Option<u16>,
}

impl TryFrom<EvidenceRecord> for Evidence {
    type Error = String;

    fn try_from(record: EvidenceRecord) -> Result<Self, Self::Error> {
        let weight = weight_of(record.kind, record.traffic).ok_or_else(|| match record.traffic {
            Some(signal) => format!("{} evidence cannot carry a {:?} signal", record.kind, signal),
            None => format!("{} evidence needs a traffic signal", record.kind),
        })?;
        Ok(Self {
            kind: record.kind,
            traffic: record.traffic,
            weight,
            detail: record.detail,
            port: record.port,
        })
    }
}

impl Evidence {
    fn new(
        kind: EvidenceKind,
        traffic: Option<TrafficSignal>,
        detail: String,
        port: Option<u16>,
    ) -> Self {
        Self {
            kind,
            traffic,
            weight: weight_of(kind, traffic).unwrap_or(0),
            detail,
            port,
        }
    }

    /// Open port from the mining table
    pub fn open_port(port: u16) -> Self {
        let label = mining_ports::service_label(port).unwrap_or("Unknown");
        Self::new(
            EvidenceKind::OpenPort,
            None,
            format!("Open port {} ({})", port, label),
            Some(port),
        )
    }

    pub fn hostname_keyword(hostname: &str, keyword: &str) -> Self {
        Self::new(
            EvidenceKind::HostnameKeyword,
            None,
            format!("Hostname {} contains '{}'", hostname, keyword),
            None,
        )
    }

    /// Stratum handshake confirmed on `port`
    pub fn stratum_protocol(port: u16) -> Self {
        Self::new(
            EvidenceKind::StratumProtocol,
            None,
            format!("Stratum protocol detected on port {}", port),
            Some(port),
        )
    }

    pub fn mining_software(port: u16, software: &str) -> Self {
        Self::new(
            EvidenceKind::MiningSoftware,
            None,
            format!("Mining software detected: {} on port {}", software, port),
            Some(port),
        )
    }

    /// Established local connection to the host on a mining port
    pub fn mining_port_traffic(remote: SocketAddr) -> Self {
        Self::new(
            EvidenceKind::TrafficPattern,
            Some(TrafficSignal::MiningPort),
            format!("Established connection to {} (mining port)", remote),
            Some(remote.port()),
        )
    }

    /// Host resolves into a known pool domain
    pub fn pool_domain_traffic(hostname: &str, domain: &str) -> Self {
        Self::new(
            EvidenceKind::TrafficPattern,
            Some(TrafficSignal::PoolDomain),
            format!("Hostname {} belongs to mining pool {}", hostname, domain),
            None,
        )
    }

    /// Observation from an external sensor provider
    pub fn external_sensor(source: &str, detail: &str) -> Self {
        Self::new(
            EvidenceKind::ExternalSensor,
            None,
            format!("{}: {}", source, detail),
            None,
        )
    }

    pub fn kind(&self) -> EvidenceKind {
        self.kind
    }

    pub fn traffic(&self) -> Option<TrafficSignal> {
        self.traffic
    }

    pub fn weight(&self) -> u8 {
        self.weight
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }
}
