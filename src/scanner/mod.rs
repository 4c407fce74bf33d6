//! Concurrent TCP connect scanning of the mining port table

pub mod engine;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::mining_ports;

pub use engine::PortScanner;

/// Port → open flag for every port probed on a host
///
/// Ordered by port number so reports and equality checks are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpenPortSet {
    ports: BTreeMap<u16, bool>,
}

impl OpenPortSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, port: u16, open: bool) {
        self.ports.insert(port, open);
    }

    pub fn is_open(&self, port: u16) -> bool {
        self.ports.get(&port).copied().unwrap_or(false)
    }

    /// Open ports, ascending
    pub fn open_ports(&self) -> Vec<u16> {
        self.ports
            .iter()
            .filter_map(|(port, open)| open.then_some(*port))
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.ports.values().filter(|open| **open).count()
    }

    pub fn has_open(&self) -> bool {
        self.ports.values().any(|open| *open)
    }

    /// Number of ports probed
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, bool)> + '_ {
        self.ports.iter().map(|(port, open)| (*port, *open))
    }

    /// Open ports with their mining-table service label, if any
    pub fn services(&self) -> BTreeMap<u16, String> {
        self.open_ports()
            .into_iter()
            .map(|port| {
                let label = mining_ports::service_label(port).unwrap_or("Unknown");
                (port, label.to_string())
            })
            .collect()
    }
}

impl FromIterator<(u16, bool)> for OpenPortSet {
    fn from_iter<I: IntoIterator<Item = (u16, bool)>>(iter: I) -> Self {
        Self {
            ports: iter.into_iter().collect(),
        }
    }
}
