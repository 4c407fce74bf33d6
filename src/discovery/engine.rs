//! Reachability prober - runs liveness probes in order

use std::net::IpAddr;
use std::sync::Arc;

use log::debug;
use tokio::sync::Semaphore;

use super::methods::{IcmpProbe, TcpProbe};
use super::{DiscoveryResult, LivenessProbe};
use crate::config::ScanConfig;
use crate::core::connector::Connector;

/// Runs its probes in order and stops at the first that sees the host alive
#[derive(Clone)]
pub struct ReachabilityProber {
    methods: Vec<Arc<dyn LivenessProbe>>,
}

impl ReachabilityProber {
    pub fn new(methods: Vec<Arc<dyn LivenessProbe>>) -> Self {
        Self { methods }
    }

    /// ICMP echo, then (if enabled) a TCP connect sweep of the fallback ports
    pub fn from_config(
        config: &ScanConfig,
        connector: Arc<dyn Connector>,
        sockets: Arc<Semaphore>,
    ) -> Self {
        let mut methods: Vec<Arc<dyn LivenessProbe>> =
            vec![Arc::new(IcmpProbe::new(config.ping_timeout()))];

        if config.tcp_fallback {
            methods.push(Arc::new(TcpProbe::new(
                config.tcp_fallback_ports.clone(),
                config.connect_timeout(),
                connector,
                sockets,
            )));
        }

        Self { methods }
    }

    /// Full probe result for `target`
    pub async fn discover(&self, target: IpAddr) -> DiscoveryResult {
        for method in &self.methods {
            let result = method.probe(target).await;
            if result.is_alive {
                debug!("{} is up ({})", target, result.method_used);
                return result;
            }
        }

        DiscoveryResult::new(target, false, "none")
    }

    /// True iff some probe got an answer from `target`
    pub async fn is_reachable(&self, target: IpAddr) -> bool {
        self.discover(target).await.is_alive
    }

    pub fn method_names(&self) -> Vec<String> {
        self.methods.iter().map(|m| m.method_name().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed {
        alive: bool,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(alive: bool) -> Arc<Self> {
            Arc::new(Self {
                alive,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl LivenessProbe for Fixed {
        async fn probe(&self, target: IpAddr) -> DiscoveryResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            DiscoveryResult::new(target, self.alive, "fixed")
        }

        fn method_name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_first_success_stops() {
        let first = Fixed::new(true);
        let second = Fixed::new(true);
        let methods: Vec<Arc<dyn LivenessProbe>> = vec![first.clone(), second.clone()];
        let prober = ReachabilityProber::new(methods);

        assert!(prober.is_reachable("10.0.0.1".parse().unwrap()).await);
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_through_to_next_method() {
        let first = Fixed::new(false);
        let second = Fixed::new(true);
        let methods: Vec<Arc<dyn LivenessProbe>> = vec![first.clone(), second.clone()];
        let prober = ReachabilityProber::new(methods);

        assert!(prober.is_reachable("10.0.0.1".parse().unwrap()).await);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_fail() {
        let methods: Vec<Arc<dyn LivenessProbe>> = vec![Fixed::new(false), Fixed::new(false)];
        let prober = ReachabilityProber::new(methods);
        let result = prober.discover("10.0.0.1".parse().unwrap()).await;
        assert!(!result.is_alive);
        assert_eq!(result.method_used, "none");
    }

    #[test]
    fn test_config_controls_fallback() {
        let connector: Arc<dyn Connector> = Arc::new(crate::core::connector::TcpConnector);
        let sockets = Arc::new(Semaphore::new(4));
        let prober =
            ReachabilityProber::from_config(&ScanConfig::default(), connector.clone(), sockets.clone());
        assert_eq!(prober.method_names(), vec!["icmp-echo", "tcp-connect"]);

        let config = ScanConfig::default().with_tcp_fallback(false);
        let prober = ReachabilityProber::from_config(&config, connector, sockets);
        assert_eq!(prober.method_names(), vec!["icmp-echo"]);
    }
}
