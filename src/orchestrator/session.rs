//! Scan session state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scoring::DetectedHost;
use crate::ScanError;

/// Lifecycle state of a scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Running,
    /// Stopped on request; restartable
    Paused,
    Completed,
    Failed,
    /// Stopped on request; final like `completed` and `failed`
    Cancelled,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Running => "running",
            ScanStatus::Paused => "paused",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
            ScanStatus::Cancelled => "cancelled",
        }
    }

    /// Allowed state machine edges
    pub fn can_transition_to(self, next: ScanStatus) -> bool {
        use ScanStatus::*;
        matches!(
            (self, next),
            (Running, Completed)
                | (Running, Failed)
                | (Running, Paused)
                | (Running, Cancelled)
                | (Paused, Running)
                | (Paused, Cancelled)
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ScanStatus::Running)
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of progress handed to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub progress: u8,
    pub scanned: usize,
    pub total: usize,
}

/// Orchestration state of one scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSession {
    pub scan_id: String,
    pub target: String,
    pub scan_type: Option<String>,
    pub status: ScanStatus,
    pub total_hosts: usize,
    pub scanned_hosts: usize,
    pub detected_miners: usize,
    /// 0-100, never decreases within a run
    pub progress: u8,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Reason for `failed`
    pub error: Option<String>,
    pub results: Vec<DetectedHost>,
}

impl ScanSession {
    pub fn new(scan_id: String, target: String, scan_type: Option<String>) -> Self {
        Self {
            scan_id,
            target,
            scan_type,
            status: ScanStatus::Running,
            total_hosts: 0,
            scanned_hosts: 0,
            detected_miners: 0,
            progress: 0,
            start_time: Utc::now(),
            end_time: None,
            error: None,
            results: Vec::new(),
        }
    }

    pub(crate) fn transition(&mut self, next: ScanStatus) -> crate::Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(ScanError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next == ScanStatus::Running {
            self.end_time = None;
        } else {
            self.end_time = Some(Utc::now());
        }
        Ok(())
    }

    pub(crate) fn fail(&mut self, reason: String) -> crate::Result<()> {
        self.transition(ScanStatus::Failed)?;
        self.error = Some(reason);
        Ok(())
    }

    /// Count one finished host and recompute progress
    pub(crate) fn record_host(&mut self, detected: Option<DetectedHost>) -> ProgressUpdate {
        self.scanned_hosts += 1;
        if let Some(host) = detected {
            self.detected_miners += 1;
            self.results.push(host);
        }

        let progress = if self.total_hosts == 0 {
            100
        } else {
            (self.scanned_hosts.min(self.total_hosts) * 100 / self.total_hosts) as u8
        };
        self.progress = self.progress.max(progress);

        ProgressUpdate {
            progress: self.progress,
            scanned: self.scanned_hosts,
            total: self.total_hosts,
        }
    }

    /// Back to a fresh `running` session for a full re-scan. Only a paused
    /// session can restart.
    pub(crate) fn restart(&mut self) -> crate::Result<()> {
        self.transition(ScanStatus::Running)?;
        self.scanned_hosts = 0;
        self.detected_miners = 0;
        self.progress = 0;
        self.error = None;
        self.results.clear();
        self.start_time = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(total: usize) -> ScanSession {
        let mut session = ScanSession::new("id".to_string(), "10.0.0.0/24".to_string(), None);
        session.total_hosts = total;
        session
    }

    #[test]
    fn test_progress_is_floored() {
        let mut s = session(3);
        assert_eq!(s.record_host(None).progress, 33);
        assert_eq!(s.record_host(None).progress, 66);
        let last = s.record_host(None);
        assert_eq!(last.progress, 100);
        assert_eq!(last.scanned, 3);
    }

    #[test]
    fn test_state_machine() {
        let mut s = session(1);
        assert!(s.transition(ScanStatus::Paused).is_ok());
        assert!(s.restart().is_ok());
        assert!(s.transition(ScanStatus::Completed).is_ok());
        assert!(s.end_time.is_some());

        let err = s.transition(ScanStatus::Paused).unwrap_err();
        assert!(matches!(
            err,
            ScanError::InvalidTransition {
                from: ScanStatus::Completed,
                to: ScanStatus::Paused
            }
        ));
        assert!(s.restart().is_err());
    }

    #[test]
    fn test_restart_resets_counters() {
        let mut s = session(2);
        s.record_host(None);
        s.transition(ScanStatus::Paused).unwrap();
        assert_eq!(s.progress, 50);

        s.restart().unwrap();
        assert_eq!(s.status, ScanStatus::Running);
        assert_eq!((s.scanned_hosts, s.progress), (0, 0));
        assert_eq!(s.end_time, None);
    }

    #[test]
    fn test_failed_and_cancelled_are_terminal() {
        let mut failed = session(2);
        failed.fail("boom".to_string()).unwrap();
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(matches!(
            failed.restart().unwrap_err(),
            ScanError::InvalidTransition {
                from: ScanStatus::Failed,
                to: ScanStatus::Running
            }
        ));
        assert_eq!(failed.status, ScanStatus::Failed);

        let mut cancelled = session(2);
        cancelled.transition(ScanStatus::Paused).unwrap();
        cancelled.transition(ScanStatus::Cancelled).unwrap();
        assert!(cancelled.restart().is_err());
        assert!(cancelled.transition(ScanStatus::Paused).is_err());
        assert_eq!(cancelled.status, ScanStatus::Cancelled);
    }
}
