use super::session::{DebugSessionInfo, RequestMode};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttachState {
    /// Asked the host to attach; it has not reported the session yet.
    Requested,
    Attached,
}

/// Which pids currently have one of our attach sessions.
///
/// Only sessions of our own kind in attach mode count; anything else the
/// host reports is ignored.
#[derive(Debug)]
pub struct DebugSessionTracker {
    kind: String,
    sessions: Mutex<HashMap<u32, AttachState>>,
}

impl DebugSessionTracker {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<u32, AttachState>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tracked_pid(&self, session: &DebugSessionInfo) -> Option<u32> {
        if session.kind != self.kind || session.request != Some(RequestMode::Attach) {
            return None;
        }
        session.process_id
    }

    /// Returns whether the session was one of ours.
    pub fn session_started(&self, session: &DebugSessionInfo) -> bool {
        let Some(pid) = self.tracked_pid(session) else {
            return false;
        };
        tracing::debug!("Debug session attached to pid {}", pid);
        self.sessions().insert(pid, AttachState::Attached);
        true
    }

    pub fn session_ended(&self, session: &DebugSessionInfo) -> bool {
        let Some(pid) = self.tracked_pid(session) else {
            return false;
        };
        tracing::debug!("Debug session for pid {} ended", pid);
        self.sessions().remove(&pid).is_some()
    }

    pub fn is_attached(&self, pid: u32) -> bool {
        self.sessions().get(&pid) == Some(&AttachState::Attached)
    }

    /// Reserves `pid` for an attach about to be requested.
    ///
    /// Fails when the pid is already attached or claimed.
    pub fn try_claim(&self, pid: u32) -> bool {
        let mut sessions = self.sessions();
        if sessions.contains_key(&pid) {
            return false;
        }
        sessions.insert(pid, AttachState::Requested);
        true
    }

    /// Drops a claim that never became a session.
    pub fn release_claim(&self, pid: u32) {
        let mut sessions = self.sessions();
        if sessions.get(&pid) == Some(&AttachState::Requested) {
            sessions.remove(&pid);
        }
    }

    pub fn attached_pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self
            .sessions()
            .iter()
            .filter(|(_, state)| **state == AttachState::Attached)
            .map(|(pid, _)| *pid)
            .collect();
        pids.sort_unstable();
        pids
    }
}
