//! Registry of live sessions and transfer counters.
//!
//! Shared by every session task; all operations are lock-free at the call site.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::SessionId;

/// Information about a live session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Unique session identifier.
    pub id: SessionId,
    /// Remote address of the client.
    pub peer: Option<SocketAddr>,
    /// When the session became ready.
    pub opened_at: DateTime<Utc>,
    /// Files stored by this session so far.
    pub files_saved: u64,
}

/// Point-in-time counters for the daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaemonStats {
    pub active_sessions: usize,
    pub sessions_completed: u64,
    pub files_saved: u64,
    pub bytes_saved: u64,
    pub transfers_rejected: u64,
}

/// Thread-safe session registry using DashMap.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionInfo>,
    sessions_completed: AtomicU64,
    files_saved: AtomicU64,
    bytes_saved: AtomicU64,
    transfers_rejected: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a session as live.
    pub fn register(&self, id: &SessionId, peer: Option<SocketAddr>) {
        self.sessions.insert(
            id.clone(),
            SessionInfo {
                id: id.clone(),
                peer,
                opened_at: Utc::now(),
                files_saved: 0,
            },
        );
    }

    /// Remove a finished session, returning its final info.
    pub fn unregister(&self, id: &SessionId) -> Option<SessionInfo> {
        let removed = self.sessions.remove(id).map(|(_, info)| info);
        if removed.is_some() {
            self.sessions_completed.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Count a stored file against a session.
    pub fn record_file(&self, id: &SessionId, bytes: u64) {
        if let Some(mut info) = self.sessions.get_mut(id) {
            info.files_saved += 1;
        }
        self.files_saved.fetch_add(1, Ordering::Relaxed);
        self.bytes_saved.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Count a rejected transfer.
    pub fn record_rejection(&self) {
        self.transfers_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionInfo> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Lists all live sessions.
    pub fn list(&self) -> Vec<SessionInfo> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Returns the number of live sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn stats(&self) -> DaemonStats {
        DaemonStats {
            active_sessions: self.count(),
            sessions_completed: self.sessions_completed.load(Ordering::Relaxed),
            files_saved: self.files_saved.load(Ordering::Relaxed),
            bytes_saved: self.bytes_saved.load(Ordering::Relaxed),
            transfers_rejected: self.transfers_rejected.load(Ordering::Relaxed),
        }
    }
}
