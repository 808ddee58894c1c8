use super::session::AttachRequest;
use super::tracker::DebugSessionTracker;
use crate::model::ServiceType;
use crate::process::{select_attach_target, ProcessEnumerator};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// The editor-side debugger that actually starts sessions.
#[async_trait]
pub trait HostDebugger: Send + Sync {
    /// Returns `false` when the host declined to start the session.
    async fn start_debugging(&self, folder: Option<&Path>, request: AttachRequest) -> Result<bool>;
}

pub struct Attacher {
    tracker: Arc<DebugSessionTracker>,
    host: Arc<dyn HostDebugger>,
    enumerator: Arc<dyn ProcessEnumerator>,
    function_host_patterns: Vec<String>,
    /// Function host pid to the runtime pid last resolved beneath it.
    runtimes: Mutex<HashMap<u32, u32>>,
}

impl Attacher {
    pub fn new(
        tracker: Arc<DebugSessionTracker>,
        host: Arc<dyn HostDebugger>,
        enumerator: Arc<dyn ProcessEnumerator>,
        function_host_patterns: Vec<String>,
    ) -> Self {
        Self {
            tracker,
            host,
            enumerator,
            function_host_patterns,
            runtimes: Mutex::new(HashMap::new()),
        }
    }

    pub fn tracker(&self) -> &Arc<DebugSessionTracker> {
        &self.tracker
    }

    /// The pid a debugger should attach to for a replica reported as `pid`.
    pub async fn resolve_attach_target(&self, service_type: ServiceType, pid: u32) -> u32 {
        if !service_type.needs_attach_indirection() {
            return pid;
        }

        let descendants = self.enumerator.descendants(pid).await;
        let mut runtimes = self.runtimes.lock().unwrap_or_else(|e| e.into_inner());
        match select_attach_target(&descendants, &self.function_host_patterns) {
            Some(target) => {
                tracing::debug!("Resolved {} host pid {} to runtime pid {}", service_type, pid, target);
                runtimes.insert(pid, target);
                target
            }
            None => {
                runtimes.remove(&pid);
                pid
            }
        }
    }

    fn known_runtime(&self, host_pid: u32) -> Option<u32> {
        self.runtimes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&host_pid)
            .copied()
    }

    /// Asks the host to attach to one replica unless it already has a session.
    ///
    /// Returns whether a request was accepted. Failures are logged, never raised.
    pub async fn attach_to_replica(
        &self,
        folder: Option<&Path>,
        service_type: ServiceType,
        replica: &str,
        pid: Option<u32>,
    ) -> bool {
        let Some(pid) = pid else {
            return false;
        };
        if self.tracker.is_attached(pid) {
            return false;
        }
        // A host whose runtime already has a session needs no new walk.
        if self.known_runtime(pid).is_some_and(|target| self.tracker.is_attached(target)) {
            return false;
        }

        let target = self.resolve_attach_target(service_type, pid).await;
        if target != pid && self.tracker.is_attached(target) {
            return false;
        }
        if !self.tracker.try_claim(target) {
            return false;
        }

        let request = AttachRequest::new(self.tracker.kind(), replica, target);
        tracing::info!("Attaching {} debugger to {} (pid {})", request.kind, replica, target);

        match self.host.start_debugging(folder, request).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!("Debugger attach to {} (pid {}) was declined", replica, target);
                self.tracker.release_claim(target);
                false
            }
            Err(e) => {
                tracing::warn!("Debugger attach to {} (pid {}) failed: {}", replica, target, e);
                self.tracker.release_claim(target);
                false
            }
        }
    }
}
