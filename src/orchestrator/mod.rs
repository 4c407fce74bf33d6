//! Scan orchestration
//!
//! Drives every candidate host of a request through the detection pipeline,
//! owns the session state machine and produces the final [`ScanResult`].
//!
//! A dispatcher task walks the address range and hands hosts to workers,
//! bounded by the host pool. Workers send their outcome over a channel to a
//! single aggregation loop, which is the only writer of the session's
//! counters, so progress is serialised and never moves backwards.

pub mod pipeline;
pub mod session;
pub mod store;

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ScanConfig;
use crate::scoring::{DetectedHost, ThreatLevel};
use crate::traffic::TrafficSnapshot;
use crate::utils::target_parser::AddressRange;
use crate::utils::Logger;
use crate::ScanError;

pub use pipeline::{HostOutcome, HostPipeline, OrchestratorBuilder};
pub use session::{ProgressUpdate, ScanSession, ScanStatus};
pub use store::{SessionStore, StopReason};

/// Receives `(progress, scanned, total)` after every finished host
///
/// Calls come from a single task, in order. Recording each call with
/// last-write-wins semantics is always safe.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, progress: u8, scanned: usize, total: usize);
}

impl<F> ProgressObserver for F
where
    F: Fn(u8, usize, usize) + Send + Sync,
{
    fn on_progress(&self, progress: u8, scanned: usize, total: usize) {
        self(progress, scanned, total)
    }
}

/// What to scan
#[derive(Clone)]
pub struct ScanRequest {
    pub target: String,
    /// Overrides the configured port list
    pub ports: Option<Vec<u16>>,
    /// Opaque tag carried into the session and result
    pub scan_type: Option<String>,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl ScanRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ports: None,
            scan_type: None,
            observer: None,
        }
    }

    pub fn with_ports(mut self, ports: Vec<u16>) -> Self {
        self.ports = Some(ports);
        self
    }

    pub fn with_scan_type(mut self, scan_type: impl Into<String>) -> Self {
        self.scan_type = Some(scan_type.into());
        self
    }

    pub fn with_observer(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }
}

impl fmt::Debug for ScanRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanRequest")
            .field("target", &self.target)
            .field("ports", &self.ports)
            .field("scan_type", &self.scan_type)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Detection counts by tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// `high` and `critical` hosts
    pub confirmed_miners: usize,
    /// `medium` hosts
    pub potential_miners: usize,
    /// `low` hosts that still passed the reporting threshold
    pub suspicious_hosts: usize,
}

impl ScanSummary {
    pub fn from_hosts<'a>(hosts: impl IntoIterator<Item = &'a DetectedHost>) -> Self {
        let mut summary = Self::default();
        for host in hosts {
            match host.threat_level {
                ThreatLevel::Critical | ThreatLevel::High => summary.confirmed_miners += 1,
                ThreatLevel::Medium => summary.potential_miners += 1,
                ThreatLevel::Low => summary.suspicious_hosts += 1,
            }
        }
        summary
    }
}

/// Final report of a scan run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub scan_id: String,
    pub target: String,
    pub scan_type: Option<String>,
    pub status: ScanStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_hosts: usize,
    pub scanned_hosts: usize,
    /// Reported hosts only
    pub hosts: BTreeMap<IpAddr, DetectedHost>,
    pub summary: ScanSummary,
}

impl ScanResult {
    pub fn from_session(session: &ScanSession) -> Self {
        let hosts: BTreeMap<IpAddr, DetectedHost> = session
            .results
            .iter()
            .map(|host| (host.address, host.clone()))
            .collect();

        Self {
            scan_id: session.scan_id.clone(),
            target: session.target.clone(),
            scan_type: session.scan_type.clone(),
            status: session.status,
            start_time: session.start_time,
            end_time: session.end_time.unwrap_or_else(Utc::now),
            total_hosts: session.total_hosts,
            scanned_hosts: session.scanned_hosts,
            summary: ScanSummary::from_hosts(hosts.values()),
            hosts,
        }
    }

    /// Reported hosts, most suspicious first
    pub fn hosts_by_confidence(&self) -> Vec<&DetectedHost> {
        let mut hosts: Vec<&DetectedHost> = self.hosts.values().collect();
        hosts.sort_by(|a, b| b.confidence.cmp(&a.confidence).then(a.address.cmp(&b.address)));
        hosts
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end_time - self.start_time
    }
}

/// Handle to a scan running in the background
pub struct ScanHandle {
    scan_id: String,
    task: JoinHandle<crate::Result<ScanResult>>,
}

impl ScanHandle {
    pub fn scan_id(&self) -> &str {
        &self.scan_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the run to reach a terminal or paused state
    pub async fn wait(self) -> crate::Result<ScanResult> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(ScanError::Orchestration(format!("scan task failed: {}", e))),
        }
    }
}

/// Validated work for one run
struct ScanPlan {
    range: AddressRange,
    total_hosts: usize,
    ports: Vec<u16>,
}

/// Owns sessions and runs scans
#[derive(Clone)]
pub struct ScanOrchestrator {
    config: Arc<ScanConfig>,
    pipeline: Arc<HostPipeline>,
    store: SessionStore,
}

impl ScanOrchestrator {
    /// Orchestrator wired to the real network
    pub fn new(config: ScanConfig) -> crate::Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ScanConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub(crate) fn from_parts(config: ScanConfig, pipeline: HostPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            store: SessionStore::new(),
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Start a scan and return immediately
    ///
    /// A malformed target fails the session and is returned here; nothing is
    /// probed in that case.
    pub async fn start(&self, request: ScanRequest) -> crate::Result<ScanHandle> {
        let scan_id = Uuid::new_v4().to_string();
        let session = ScanSession::new(
            scan_id.clone(),
            request.target.trim().to_string(),
            request.scan_type.clone(),
        );
        let token = self.store.insert(session, request.clone()).await;
        self.launch(scan_id, request, token).await
    }

    /// Start a scan and wait for it
    pub async fn run(&self, request: ScanRequest) -> crate::Result<ScanResult> {
        self.start(request).await?.wait().await
    }

    pub async fn status(&self, scan_id: &str) -> crate::Result<ScanSession> {
        self.store
            .get(scan_id)
            .await
            .ok_or_else(|| ScanError::SessionNotFound(scan_id.to_string()))
    }

    /// Result view of a session in whatever state it is in
    pub async fn result(&self, scan_id: &str) -> crate::Result<ScanResult> {
        Ok(ScanResult::from_session(&self.status(scan_id).await?))
    }

    /// Stop dispatching hosts; the session ends `paused` and can be restarted
    pub async fn pause(&self, scan_id: &str) -> crate::Result<()> {
        self.store.request_stop(scan_id, StopReason::Pause).await
    }

    /// Stop dispatching hosts; the session ends `cancelled`
    pub async fn cancel(&self, scan_id: &str) -> crate::Result<()> {
        self.store.request_stop(scan_id, StopReason::Cancel).await
    }

    /// Re-run a paused session from scratch
    pub async fn restart(&self, scan_id: &str) -> crate::Result<ScanHandle> {
        let (request, token) = self.store.prepare_restart(scan_id).await?;
        info!("Restarting scan {} from the beginning", scan_id);
        self.launch(scan_id.to_string(), request, token).await
    }

    pub async fn purge(&self, scan_id: &str) -> crate::Result<ScanSession> {
        self.store.purge(scan_id).await
    }

    pub async fn list(&self) -> Vec<ScanSession> {
        self.store.list().await
    }

    async fn launch(
        &self,
        scan_id: String,
        request: ScanRequest,
        token: CancellationToken,
    ) -> crate::Result<ScanHandle> {
        let plan = match self.plan(&request) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Scan {} rejected: {}", scan_id, e);
                let reason = e.to_string();
                match self.store.update(&scan_id, |s| s.fail(reason)).await {
                    Ok(Err(transition)) => warn!("Could not fail scan {}: {}", scan_id, transition),
                    Err(missing) => warn!("Could not fail scan {}: {}", scan_id, missing),
                    Ok(Ok(())) => {}
                }
                return Err(e);
            }
        };

        let total_hosts = plan.total_hosts;
        self.store
            .update(&scan_id, |s| s.total_hosts = total_hosts)
            .await?;

        let run = ScanRun {
            scan_id: scan_id.clone(),
            plan,
            token,
            observer: request.observer,
            pipeline: self.pipeline.clone(),
            store: self.store.clone(),
            host_concurrency: self.config.max_concurrent_hosts,
        };
        let task = tokio::spawn(run.execute());

        Ok(ScanHandle { scan_id, task })
    }

    fn plan(&self, request: &ScanRequest) -> crate::Result<ScanPlan> {
        let range = AddressRange::parse(&request.target)?;
        let total_hosts = range.ensure_within(self.config.max_hosts)?;

        let ports = match &request.ports {
            Some(ports) => {
                if ports.is_empty() {
                    return Err(ScanError::Config("No ports specified".to_string()));
                }
                if ports.contains(&0) {
                    return Err(ScanError::Config("Port 0 cannot be scanned".to_string()));
                }
                let mut ports = ports.clone();
                ports.sort_unstable();
                ports.dedup();
                ports
            }
            None => self.config.effective_ports(),
        };

        Ok(ScanPlan {
            range,
            total_hosts,
            ports,
        })
    }
}

/// Everything one run needs, moved into its task
struct ScanRun {
    scan_id: String,
    plan: ScanPlan,
    token: CancellationToken,
    observer: Option<Arc<dyn ProgressObserver>>,
    pipeline: Arc<HostPipeline>,
    store: SessionStore,
    host_concurrency: usize,
}

impl ScanRun {
    async fn execute(self) -> crate::Result<ScanResult> {
        let started = Instant::now();
        Logger::log_scan_start(
            &self.scan_id,
            self.plan.range.original(),
            self.plan.total_hosts,
            self.plan.ports.len(),
        );

        let traffic = Arc::new(TrafficSnapshot::capture(self.pipeline.connections()).await);
        let (tx, mut rx) = mpsc::channel::<HostOutcome>(self.host_concurrency.max(1));

        let dispatcher = tokio::spawn(dispatch(
            self.plan.range.clone(),
            Arc::from(self.plan.ports.clone()),
            traffic,
            self.pipeline.clone(),
            self.token.clone(),
            self.host_concurrency,
            tx,
        ));

        let mut session_lost = false;
        while let Some(outcome) = rx.recv().await {
            match self
                .store
                .update(&self.scan_id, |s| s.record_host(outcome.detected))
                .await
            {
                Ok(update) => {
                    if let Some(observer) = &self.observer {
                        observer.on_progress(update.progress, update.scanned, update.total);
                    }
                }
                Err(_) => {
                    // purged while running
                    self.token.cancel();
                    session_lost = true;
                }
            }
        }

        let dispatched = match dispatcher.await {
            Ok(result) => result,
            Err(e) => Err(ScanError::Orchestration(format!("dispatcher failed: {}", e))),
        };
        if session_lost {
            return Err(ScanError::SessionNotFound(self.scan_id));
        }

        let stop = self.store.stop_reason(&self.scan_id).await;
        let failure = dispatched.as_ref().err().map(|e| e.to_string());
        let session = self
            .store
            .update(&self.scan_id, |s| {
                let transition = match failure {
                    Some(reason) => s.fail(reason),
                    None if s.scanned_hosts >= s.total_hosts => s.transition(ScanStatus::Completed),
                    None => s.transition(stop.unwrap_or(StopReason::Cancel).status()),
                };
                transition.map(|_| s.clone())
            })
            .await??;

        dispatched?;

        Logger::log_scan_complete(
            &self.scan_id,
            session.status,
            started.elapsed(),
            session.scanned_hosts,
            session.detected_miners,
        );
        Ok(ScanResult::from_session(&session))
    }
}

/// Walk the range and spawn one worker per host, bounded by the host pool
async fn dispatch(
    range: AddressRange,
    ports: Arc<[u16]>,
    traffic: Arc<TrafficSnapshot>,
    pipeline: Arc<HostPipeline>,
    token: CancellationToken,
    host_concurrency: usize,
    tx: mpsc::Sender<HostOutcome>,
) -> crate::Result<()> {
    let host_slots = Arc::new(Semaphore::new(host_concurrency));

    for address in range.hosts() {
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            permit = host_slots.clone().acquire_owned() => permit.map_err(|e| {
                ScanError::Orchestration(format!("host pool unavailable: {}", e))
            })?,
        };

        let pipeline = pipeline.clone();
        let ports = ports.clone();
        let traffic = traffic.clone();
        let token = token.clone();
        let tx = tx.clone();

        tokio::spawn(async move {
            let _permit = permit;

            // separate task so a panicking host still counts as scanned
            let work = tokio::spawn(async move {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    outcome = pipeline.process(address, &ports, &traffic) => Some(outcome),
                }
            });

            let outcome = match work.await {
                Ok(Some(outcome)) => outcome,
                Ok(None) => return,
                Err(e) => {
                    warn!("Worker for {} failed: {}", address, e);
                    HostOutcome::unreachable(address)
                }
            };
            let _ = tx.send(outcome).await;
        });
    }

    Ok(())
}
