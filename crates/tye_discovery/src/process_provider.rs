//! Finds running orchestrators through the process table and pins each to
//! the local port its dashboard answers on.

use crate::candidate::{AsCandidate, DashboardCandidate};
use crate::compare::unordered_eq;
use crate::error::DiscoveryError;
use crate::poll::{first_value, publish_distinct, SwitchLatest, TaskGuard};
use crate::ports::PortLister;
use crate::process::ProcessEnumerator;
use crate::tool_path::ToolPathProvider;
use crate::Result;
use futures_util::future::join_all;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tye_bridge_core::ClientProvider;

/// An orchestrator process and every TCP port it listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TyeProcessWithPorts {
    pub pid: u32,
    pub ports: Vec<u16>,
}

/// An orchestrator process whose dashboard answered on `dashboard_port`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TyeProcess {
    pub pid: u32,
    pub dashboard_port: u16,
}

impl AsCandidate for TyeProcess {
    fn candidate(&self) -> DashboardCandidate {
        DashboardCandidate {
            pid: Some(self.pid),
            ..DashboardCandidate::localhost(self.dashboard_port)
        }
    }
}

pub fn process_tables_equal(x: &[TyeProcessWithPorts], y: &[TyeProcessWithPorts]) -> bool {
    unordered_eq(
        x,
        y,
        |a, b| a.pid.cmp(&b.pid),
        |a, b| {
            let mut left = a.ports.clone();
            let mut right = b.ports.clone();
            left.sort_unstable();
            right.sort_unstable();
            a.pid == b.pid && left == right
        },
    )
}

pub fn processes_equal(x: &[TyeProcess], y: &[TyeProcess]) -> bool {
    unordered_eq(x, y, |a, b| a.pid.cmp(&b.pid), |a, b| a == b)
}

/// Everything one scan needs, shareable with the spawned work.
#[derive(Clone)]
pub struct ProcessSources {
    pub tool_path: Arc<ToolPathProvider>,
    pub enumerator: Arc<dyn ProcessEnumerator>,
    pub ports: Arc<dyn PortLister>,
    pub clients: ClientProvider,
}

/// Hot, shared process discovery: one poll loop no matter how many subscribers.
#[derive(Clone)]
pub struct ProcessProvider {
    processes: watch::Receiver<Option<Vec<TyeProcess>>>,
    _task: Arc<TaskGuard>,
}

impl ProcessProvider {
    pub fn spawn(sources: ProcessSources, poll_interval: Duration) -> Self {
        let (tx, processes) = watch::channel(None);
        let task = TaskGuard::spawn(run(sources, poll_interval, tx));

        Self {
            processes,
            _task: Arc::new(task),
        }
    }

    /// Replays the latest known list; `None` until the first probe completes.
    pub fn processes(&self) -> watch::Receiver<Option<Vec<TyeProcess>>> {
        self.processes.clone()
    }

    pub async fn get_processes(&self) -> Result<Vec<TyeProcess>> {
        first_value(&self.processes)
            .await
            .ok_or(DiscoveryError::DiscoveryStopped)
    }
}

async fn run(
    sources: ProcessSources,
    poll_interval: Duration,
    tx: watch::Sender<Option<Vec<TyeProcess>>>,
) {
    // Resolved once, outside any scan a later tick could abandon.
    let tool_path = tokio::select! {
        path = sources.tool_path.tool_path() => Arc::new(path),
        _ = tx.closed() => return,
    };
    tracing::debug!("Looking for {} processes", tool_path.display());

    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut scanning: SwitchLatest<Vec<TyeProcessWithPorts>> = SwitchLatest::new();
    let mut probing: SwitchLatest<Vec<TyeProcess>> = SwitchLatest::new();
    let mut last_table: Option<Vec<TyeProcessWithPorts>> = None;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let sources = sources.clone();
                let tool_path = tool_path.clone();
                scanning.start(move |_| async move { scan(&sources, &tool_path).await });
            }
            table = scanning.next() => {
                if matches!(&last_table, Some(last) if process_tables_equal(last, &table)) {
                    continue;
                }

                tracing::debug!(processes = table.len(), "Process table changed, probing dashboards");
                last_table = Some(table.clone());

                let clients = sources.clients.clone();
                probing.start(move |cancel| probe(table, clients, cancel));
            }
            found = probing.next() => {
                if publish_distinct(&tx, found.clone(), |a, b| processes_equal(a, b)) {
                    tracing::info!("Dashboards found: {:?}", found);
                }
            }
            _ = tx.closed() => {
                tracing::trace!("No process subscribers left");
                return;
            }
        }
    }
}

async fn scan(sources: &ProcessSources, tool_path: &Path) -> Vec<TyeProcessWithPorts> {
    let processes = sources.enumerator.list_processes(tool_path).await;

    join_all(processes.into_iter().map(|process| async move {
        TyeProcessWithPorts {
            pid: process.pid,
            ports: sources.ports.listening_ports(process.pid).await,
        }
    }))
    .await
}

async fn probe(
    table: Vec<TyeProcessWithPorts>,
    clients: ClientProvider,
    cancel: CancellationToken,
) -> Vec<TyeProcess> {
    let probes = table.iter().map(|candidate| {
        let clients = &clients;
        let cancel = &cancel;
        async move {
            let port = find_dashboard_port(candidate, clients, cancel).await?;
            Some(TyeProcess {
                pid: candidate.pid,
                dashboard_port: port,
            })
        }
    });

    join_all(probes).await.into_iter().flatten().collect()
}

/// Tries each port in turn with the side-effect free liveness probe; first answer wins.
async fn find_dashboard_port(
    candidate: &TyeProcessWithPorts,
    clients: &ClientProvider,
    cancel: &CancellationToken,
) -> Option<u16> {
    for &port in &candidate.ports {
        let Some(client) = clients(&DashboardCandidate::localhost(port).dashboard) else {
            continue;
        };

        match client.get_endpoints(cancel).await {
            Ok(_) => return Some(port),
            Err(e) => {
                tracing::trace!(pid = candidate.pid, port, "Not a dashboard: {}", e);
            }
        }
    }

    None
}
