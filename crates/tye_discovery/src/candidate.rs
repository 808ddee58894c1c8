/// A dashboard that may belong to a running application, however it was found.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DashboardCandidate {
    pub dashboard: String,
    /// Orchestrator pid when discovered through the process table.
    pub pid: Option<u32>,
    /// Instance name when discovered through mDNS.
    pub name_hint: Option<String>,
}

impl DashboardCandidate {
    pub fn localhost(port: u16) -> Self {
        Self {
            dashboard: format!("http://localhost:{port}"),
            pid: None,
            name_hint: None,
        }
    }
}

/// Anything a discovery source emits that the reconciler can probe.
pub trait AsCandidate: Clone + Send + Sync + 'static {
    fn candidate(&self) -> DashboardCandidate;
}

impl AsCandidate for DashboardCandidate {
    fn candidate(&self) -> DashboardCandidate {
        self.clone()
    }
}
