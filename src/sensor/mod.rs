//! External sensor capability
//!
//! Physical-layer observations (RF, thermal, acoustic, power draw) come from
//! hardware this crate does not drive. A [`SensorProvider`] turns whatever
//! such a device reports about a location into `external_sensor` evidence,
//! which always carries the fixed external-sensor weight.

use async_trait::async_trait;
use std::net::IpAddr;

use crate::scoring::Evidence;

/// Where the scanner wants an observation for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorLocation {
    pub address: IpAddr,
    pub mac: Option<String>,
    pub hostname: Option<String>,
}

#[async_trait]
pub trait SensorProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Evidence for `location`. Use [`Evidence::external_sensor`]; other kinds are discarded.
    async fn observe(&self, location: &SensorLocation) -> Vec<Evidence>;
}

/// No sensors attached
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSensors;

#[async_trait]
impl SensorProvider for NoSensors {
    fn name(&self) -> &str {
        "none"
    }

    async fn observe(&self, _location: &SensorLocation) -> Vec<Evidence> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_sensors_observe_nothing() {
        let location = SensorLocation {
            address: "10.0.0.4".parse().unwrap(),
            mac: None,
            hostname: None,
        };
        assert!(NoSensors.observe(&location).await.is_empty());
        assert_eq!(NoSensors.name(), "none");
    }
}
