//! Per-host detection pipeline
//!
//! Probe, port scan, fingerprint, look up host details, gather traffic and
//! sensor evidence, score. Everything a worker learns about its host stays
//! local until the outcome is handed to the aggregation loop.

use std::net::IpAddr;
use std::sync::Arc;

use futures::future::join_all;
use log::debug;
use tokio::sync::Semaphore;

use super::ScanOrchestrator;
use crate::config::ScanConfig;
use crate::core::connector::{Connector, TcpConnector};
use crate::discovery::ReachabilityProber;
use crate::fingerprint::{Fingerprinter, HostInfoResolver, SystemResolver};
use crate::scanner::PortScanner;
use crate::scoring::{DetectedHost, HostObservation, ScoringEngine};
use crate::sensor::{NoSensors, SensorLocation, SensorProvider};
use crate::traffic::{ConnectionTable, NetstatTable, NoTraffic, TrafficSnapshot};

/// What a worker reports for one host
#[derive(Debug, Clone)]
pub struct HostOutcome {
    pub address: IpAddr,
    pub reachable: bool,
    pub detected: Option<DetectedHost>,
}

impl HostOutcome {
    pub fn unreachable(address: IpAddr) -> Self {
        Self {
            address,
            reachable: false,
            detected: None,
        }
    }
}

/// The components one host passes through
pub struct HostPipeline {
    prober: ReachabilityProber,
    scanner: PortScanner,
    fingerprinter: Fingerprinter,
    resolver: Arc<dyn HostInfoResolver>,
    sensors: Arc<dyn SensorProvider>,
    connections: Arc<dyn ConnectionTable>,
    scoring: ScoringEngine,
}

impl HostPipeline {
    pub async fn process(
        &self,
        address: IpAddr,
        ports: &[u16],
        traffic: &TrafficSnapshot,
    ) -> HostOutcome {
        if !self.prober.is_reachable(address).await {
            debug!("{} unreachable, skipping", address);
            return HostOutcome::unreachable(address);
        }

        let open_ports = self.scanner.scan_ports(address, ports).await;

        let fingerprints = open_ports
            .open_ports()
            .into_iter()
            .map(|port| self.fingerprinter.fingerprint(address, port));
        let (fingerprints, host_info) =
            tokio::join!(join_all(fingerprints), self.resolver.resolve(address));

        let location = SensorLocation {
            address,
            mac: host_info.mac.clone(),
            hostname: host_info.hostname.clone(),
        };
        let sensor = self.sensors.observe(&location).await;
        let traffic = traffic.evidence_for(address, host_info.hostname.as_deref());

        let observation = HostObservation {
            address,
            host_info,
            open_ports,
            fingerprints,
            traffic,
            sensor,
        };

        HostOutcome {
            address,
            reachable: true,
            detected: self.scoring.assess(observation),
        }
    }

    pub fn connections(&self) -> &dyn ConnectionTable {
        self.connections.as_ref()
    }
}

/// Assembles a [`ScanOrchestrator`], defaulting every seam to the real network
pub struct OrchestratorBuilder {
    config: ScanConfig,
    connector: Option<Arc<dyn Connector>>,
    prober: Option<ReachabilityProber>,
    resolver: Option<Arc<dyn HostInfoResolver>>,
    sensors: Option<Arc<dyn SensorProvider>>,
    connections: Option<Arc<dyn ConnectionTable>>,
}

impl OrchestratorBuilder {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            connector: None,
            prober: None,
            resolver: None,
            sensors: None,
            connections: None,
        }
    }

    /// Connector used by the TCP fallback probe, the scanner and the fingerprinter
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn prober(mut self, prober: ReachabilityProber) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn HostInfoResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn sensors(mut self, sensors: Arc<dyn SensorProvider>) -> Self {
        self.sensors = Some(sensors);
        self
    }

    pub fn connections(mut self, connections: Arc<dyn ConnectionTable>) -> Self {
        self.connections = Some(connections);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn build(self) -> crate::Result<ScanOrchestrator> {
        let config = self.config;
        config.validate()?;

        let connector = self.connector.unwrap_or_else(|| Arc::new(TcpConnector));
        let sockets = Arc::new(Semaphore::new(config.max_in_flight_sockets));

        let prober = self
            .prober
            .unwrap_or_else(|| ReachabilityProber::from_config(&config, connector.clone(), sockets.clone()));
        let scanner = PortScanner::from_config(&config, connector.clone(), sockets.clone());
        let fingerprinter = Fingerprinter::from_config(&config, connector, sockets);
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(SystemResolver::new(config.dns_timeout())));
        let sensors = self.sensors.unwrap_or_else(|| Arc::new(NoSensors));
        let connections: Arc<dyn ConnectionTable> = match self.connections {
            Some(connections) => connections,
            None if config.traffic_analysis => Arc::new(NetstatTable::new(config.dns_timeout())),
            None => Arc::new(NoTraffic),
        };

        let pipeline = HostPipeline {
            prober,
            scanner,
            fingerprinter,
            resolver,
            sensors,
            connections,
            scoring: ScoringEngine::new(),
        };
        Ok(ScanOrchestrator::from_parts(config, pipeline))
    }
}
