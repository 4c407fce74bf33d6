//! In-memory session store, keyed by scan id

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::session::{ScanSession, ScanStatus};
use super::ScanRequest;
use crate::ScanError;

/// Why a running scan was asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Pause,
    Cancel,
}

impl StopReason {
    pub fn status(&self) -> ScanStatus {
        match self {
            StopReason::Pause => ScanStatus::Paused,
            StopReason::Cancel => ScanStatus::Cancelled,
        }
    }
}

struct SessionEntry {
    session: ScanSession,
    request: ScanRequest,
    token: CancellationToken,
    stop: Option<StopReason>,
}

/// Sessions live here from scan start until purged
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn insert(&self, session: ScanSession, request: ScanRequest) -> CancellationToken {
        let token = CancellationToken::new();
        let entry = SessionEntry {
            session: session.clone(),
            request,
            token: token.clone(),
            stop: None,
        };
        self.sessions.write().await.insert(session.scan_id, entry);
        token
    }

    /// Copy of the session
    pub async fn get(&self, scan_id: &str) -> Option<ScanSession> {
        self.sessions
            .read()
            .await
            .get(scan_id)
            .map(|entry| entry.session.clone())
    }

    /// All sessions, oldest first
    pub async fn list(&self) -> Vec<ScanSession> {
        let mut sessions: Vec<ScanSession> = self
            .sessions
            .read()
            .await
            .values()
            .map(|entry| entry.session.clone())
            .collect();
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        sessions
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Mutate a session under the write lock
    pub(crate) async fn update<R>(
        &self,
        scan_id: &str,
        f: impl FnOnce(&mut ScanSession) -> R,
    ) -> crate::Result<R> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(scan_id)
            .ok_or_else(|| ScanError::SessionNotFound(scan_id.to_string()))?;
        Ok(f(&mut entry.session))
    }

    /// Ask a running scan to stop dispatching hosts
    pub(crate) async fn request_stop(&self, scan_id: &str, reason: StopReason) -> crate::Result<()> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(scan_id)
            .ok_or_else(|| ScanError::SessionNotFound(scan_id.to_string()))?;

        if !entry.session.status.is_active() {
            // a paused scan can still be cancelled outright
            if entry.session.status == ScanStatus::Paused && reason == StopReason::Cancel {
                return entry.session.transition(ScanStatus::Cancelled);
            }
            return Err(ScanError::InvalidTransition {
                from: entry.session.status,
                to: reason.status(),
            });
        }

        entry.stop.get_or_insert(reason);
        entry.token.cancel();
        Ok(())
    }

    pub(crate) async fn stop_reason(&self, scan_id: &str) -> Option<StopReason> {
        self.sessions
            .read()
            .await
            .get(scan_id)
            .and_then(|entry| entry.stop)
    }

    /// Reset a stopped or failed session for a full re-scan
    pub(crate) async fn prepare_restart(
        &self,
        scan_id: &str,
    ) -> crate::Result<(ScanRequest, CancellationToken)> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(scan_id)
            .ok_or_else(|| ScanError::SessionNotFound(scan_id.to_string()))?;

        entry.session.restart()?;
        entry.stop = None;
        entry.token = CancellationToken::new();
        Ok((entry.request.clone(), entry.token.clone()))
    }

    /// Drop a session; a running scan is cancelled first
    pub async fn purge(&self, scan_id: &str) -> crate::Result<ScanSession> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(scan_id)
            .ok_or_else(|| ScanError::SessionNotFound(scan_id.to_string()))?;
        entry.token.cancel();
        Ok(entry.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_session() -> (SessionStore, CancellationToken) {
        let store = SessionStore::new();
        let session = ScanSession::new("s1".to_string(), "10.0.0.1".to_string(), None);
        let token = store.insert(session, ScanRequest::new("10.0.0.1")).await;
        (store, token)
    }

    #[tokio::test]
    async fn test_pause_cancels_token() {
        let (store, token) = store_with_session().await;
        store.request_stop("s1", StopReason::Pause).await.unwrap();
        assert!(token.is_cancelled());
        assert_eq!(store.stop_reason("s1").await, Some(StopReason::Pause));

        // a second request does not override the first reason
        store.request_stop("s1", StopReason::Cancel).await.unwrap();
        assert_eq!(store.stop_reason("s1").await, Some(StopReason::Pause));
    }

    #[tokio::test]
    async fn test_restart_issues_fresh_token() {
        let (store, token) = store_with_session().await;
        store.request_stop("s1", StopReason::Pause).await.unwrap();
        store
            .update("s1", |s| s.transition(ScanStatus::Paused))
            .await
            .unwrap()
            .unwrap();

        let (request, fresh) = store.prepare_restart("s1").await.unwrap();
        assert_eq!(request.target, "10.0.0.1");
        assert!(token.is_cancelled());
        assert!(!fresh.is_cancelled());
        assert_eq!(store.stop_reason("s1").await, None);
        assert_eq!(store.get("s1").await.unwrap().status, ScanStatus::Running);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let store = SessionStore::new();
        assert!(store.get("nope").await.is_none());
        assert!(matches!(
            store.request_stop("nope", StopReason::Cancel).await,
            Err(ScanError::SessionNotFound(_))
        ));
        assert!(store.purge("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_purge_removes() {
        let (store, token) = store_with_session().await;
        let session = store.purge("s1").await.unwrap();
        assert_eq!(session.scan_id, "s1");
        assert!(token.is_cancelled());
        assert!(store.is_empty().await);
    }
}
