//! In-memory stand-ins for the OS, the dashboards and the host debugger.

use crate::debug::{AttachRequest, DebugSessionInfo, DebugSessionTracker, HostDebugger};
use crate::model::{Application, Replica, Service, ServiceType};
use crate::ports::PortLister;
use crate::process::{ProcessEnumerator, ProcessInfo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tye_bridge_core::types::{ApplicationResponse, ReplicaResponse, ServiceDescription, ServiceResponse};
use tye_bridge_core::{ClientProvider, TyeClient, TyeError};

pub fn service_response(
    name: &str,
    service_type: &str,
    replicas: &[(&str, Option<u32>, &[u16])],
) -> ServiceResponse {
    ServiceResponse {
        description: ServiceDescription { name: name.to_string() },
        replicas: replicas
            .iter()
            .map(|(replica, pid, ports)| {
                (
                    replica.to_string(),
                    ReplicaResponse {
                        name: replica.to_string(),
                        pid: *pid,
                        environment: Some(HashMap::new()),
                        ports: Some(ports.to_vec()),
                    },
                )
            })
            .collect(),
        service_type: service_type.to_string(),
        service_source: None,
    }
}

pub fn application(id: &str, services: &[(&str, ServiceType, &[(&str, Option<u32>)])]) -> Application {
    Application {
        id: id.to_string(),
        name: format!("app-{id}"),
        dashboard: "http://localhost:8000".to_string(),
        pid: None,
        services: services
            .iter()
            .map(|(name, service_type, replicas)| {
                let service = Service {
                    name: name.to_string(),
                    service_type: *service_type,
                    replicas: replicas
                        .iter()
                        .map(|(replica, pid)| {
                            (
                                replica.to_string(),
                                Replica {
                                    name: replica.to_string(),
                                    pid: *pid,
                                    environment: HashMap::new(),
                                    ports: vec![],
                                },
                            )
                        })
                        .collect(),
                };
                (name.to_string(), service)
            })
            .collect(),
    }
}

#[derive(Debug, Clone, Default)]
struct Dashboard {
    application: Option<ApplicationResponse>,
    services: Vec<ServiceResponse>,
    logs: HashMap<String, String>,
    endpoints_fail: bool,
    delay: Duration,
}

#[derive(Default)]
struct ClientState {
    dashboards: HashMap<String, Dashboard>,
    calls: HashMap<String, Vec<&'static str>>,
}

/// Dashboards keyed by URL. Unknown URLs behave like a closed port.
#[derive(Clone, Default)]
pub struct MockClients {
    state: Arc<Mutex<ClientState>>,
}

impl MockClients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dashboard(&self, dashboard: &str, id: &str, name: &str, services: Vec<ServiceResponse>) {
        self.state.lock().unwrap().dashboards.insert(
            dashboard.to_string(),
            Dashboard {
                application: Some(ApplicationResponse {
                    id: Some(id.to_string()),
                    name: Some(name.to_string()),
                    source: None,
                }),
                services,
                ..Dashboard::default()
            },
        );
    }

    pub fn set_services(&self, dashboard: &str, services: Vec<ServiceResponse>) {
        if let Some(found) = self.state.lock().unwrap().dashboards.get_mut(dashboard) {
            found.services = services;
        }
    }

    pub fn set_log(&self, dashboard: &str, service: &str, log: &str) {
        if let Some(found) = self.state.lock().unwrap().dashboards.get_mut(dashboard) {
            found.logs.insert(service.to_string(), log.to_string());
        }
    }

    /// Something listens here but it is not a dashboard.
    pub fn fail_endpoints(&self, dashboard: &str) {
        self.state
            .lock()
            .unwrap()
            .dashboards
            .entry(dashboard.to_string())
            .or_default()
            .endpoints_fail = true;
    }

    /// Every call to this dashboard answers only after `delay`.
    pub fn set_delay(&self, dashboard: &str, delay: Duration) {
        if let Some(found) = self.state.lock().unwrap().dashboards.get_mut(dashboard) {
            found.delay = delay;
        }
    }

    pub fn calls(&self, dashboard: &str) -> Vec<&'static str> {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(dashboard)
            .cloned()
            .unwrap_or_default()
    }

    pub fn provider(&self) -> ClientProvider {
        let state = self.state.clone();
        Arc::new(move |dashboard: &str| {
            if !(dashboard.starts_with("http://") || dashboard.starts_with("https://")) {
                return None;
            }
            Some(Arc::new(MockClient {
                dashboard: dashboard.to_string(),
                state: state.clone(),
            }) as Arc<dyn TyeClient>)
        })
    }
}

struct MockClient {
    dashboard: String,
    state: Arc<Mutex<ClientState>>,
}

impl MockClient {
    fn record(&self, call: &'static str) -> Option<Dashboard> {
        let mut state = self.state.lock().unwrap();
        state.calls.entry(self.dashboard.clone()).or_default().push(call);
        state.dashboards.get(&self.dashboard).cloned()
    }

    async fn answer(&self, call: &'static str) -> Option<Dashboard> {
        let dashboard = self.record(call);
        if let Some(delay) = dashboard.as_ref().map(|d| d.delay).filter(|d| !d.is_zero()) {
            tokio::time::sleep(delay).await;
        }
        dashboard
    }

    fn refused(&self) -> TyeError {
        TyeError::InvalidResponse(format!("connection refused: {}", self.dashboard))
    }
}

#[async_trait]
impl TyeClient for MockClient {
    fn dashboard(&self) -> &str {
        &self.dashboard
    }

    async fn get_application(&self, _cancel: &CancellationToken) -> tye_bridge_core::Result<ApplicationResponse> {
        self.answer("application")
            .await
            .and_then(|d| d.application)
            .ok_or_else(|| self.refused())
    }

    async fn get_services(&self, _cancel: &CancellationToken) -> tye_bridge_core::Result<Vec<ServiceResponse>> {
        self.answer("services")
            .await
            .filter(|d| d.application.is_some())
            .map(|d| d.services)
            .ok_or_else(|| self.refused())
    }

    async fn get_endpoints(&self, _cancel: &CancellationToken) -> tye_bridge_core::Result<Vec<String>> {
        match self.answer("endpoints").await {
            Some(d) if !d.endpoints_fail => Ok(vec![format!("{}/api/v1/services", self.dashboard)]),
            _ => Err(self.refused()),
        }
    }

    async fn get_log(&self, service_name: &str, _cancel: &CancellationToken) -> tye_bridge_core::Result<String> {
        self.answer("log")
            .await
            .and_then(|mut d| d.logs.remove(service_name))
            .ok_or_else(|| TyeError::Http {
                status: 404,
                url: format!("{}/api/v1/logs/{}", self.dashboard, service_name),
            })
    }

    async fn shut_down(&self, _cancel: &CancellationToken) -> tye_bridge_core::Result<()> {
        self.answer("shutdown").await.map(|_| ()).ok_or_else(|| self.refused())
    }
}

#[derive(Clone, Default)]
pub struct MockEnumerator {
    processes: Arc<Mutex<Vec<ProcessInfo>>>,
    descendants: Arc<Mutex<HashMap<u32, Vec<(ProcessInfo, usize)>>>>,
    walks: Arc<AtomicUsize>,
}

fn info(pid: u32, name: &str) -> ProcessInfo {
    ProcessInfo {
        pid,
        name: name.to_string(),
        command_line: format!("{name} run"),
    }
}

impl MockEnumerator {
    pub fn with_processes(processes: &[(u32, &str)]) -> Self {
        let enumerator = Self::default();
        enumerator.set_processes(processes);
        enumerator
    }

    pub fn set_processes(&self, processes: &[(u32, &str)]) {
        *self.processes.lock().unwrap() = processes.iter().map(|(pid, name)| info(*pid, name)).collect();
    }

    pub fn set_descendants(&self, root: u32, children: &[(u32, &str, usize)]) {
        self.descendants.lock().unwrap().insert(
            root,
            children
                .iter()
                .map(|(pid, name, depth)| (info(*pid, name), *depth))
                .collect(),
        );
    }

    /// How many descendant walks have been requested.
    pub fn walks(&self) -> usize {
        self.walks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessEnumerator for MockEnumerator {
    async fn list_processes(&self, _executable: &Path) -> Vec<ProcessInfo> {
        self.processes.lock().unwrap().clone()
    }

    async fn descendants(&self, pid: u32) -> Vec<(ProcessInfo, usize)> {
        self.walks.fetch_add(1, Ordering::SeqCst);
        self.descendants.lock().unwrap().get(&pid).cloned().unwrap_or_default()
    }
}

#[derive(Clone, Default)]
pub struct MockPorts {
    ports: Arc<Mutex<HashMap<u32, Vec<u16>>>>,
}

impl MockPorts {
    pub fn new(ports: &[(u32, &[u16])]) -> Self {
        let mock = Self::default();
        for (pid, listening) in ports {
            mock.set(*pid, listening);
        }
        mock
    }

    pub fn set(&self, pid: u32, ports: &[u16]) {
        self.ports.lock().unwrap().insert(pid, ports.to_vec());
    }
}

#[async_trait]
impl PortLister for MockPorts {
    async fn listening_ports(&self, pid: u32) -> Vec<u16> {
        self.ports.lock().unwrap().get(&pid).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostBehavior {
    /// Accepts and reports the session start, like a real editor.
    ReportSessions,
    /// Accepts but never reports anything.
    Silent,
    Decline,
}

/// Records every attach request handed to the host.
#[derive(Clone)]
pub struct SpyDebugger {
    behavior: HostBehavior,
    tracker: Arc<DebugSessionTracker>,
    requests: Arc<Mutex<Vec<(Option<PathBuf>, AttachRequest)>>>,
}

impl SpyDebugger {
    fn with_behavior(kind: &str, behavior: HostBehavior) -> Self {
        Self {
            behavior,
            tracker: Arc::new(DebugSessionTracker::new(kind)),
            requests: Arc::default(),
        }
    }

    pub fn reporting_sessions(kind: &str) -> Self {
        Self::with_behavior(kind, HostBehavior::ReportSessions)
    }

    pub fn silent(kind: &str) -> Self {
        Self::with_behavior(kind, HostBehavior::Silent)
    }

    pub fn declining(kind: &str) -> Self {
        Self::with_behavior(kind, HostBehavior::Decline)
    }

    pub fn tracker(&self) -> Arc<DebugSessionTracker> {
        self.tracker.clone()
    }

    pub fn requests(&self) -> Vec<AttachRequest> {
        self.requests.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn requested_pids(&self) -> Vec<u32> {
        self.requests().iter().map(|r| r.process_id).collect()
    }

    pub fn folders(&self) -> Vec<Option<PathBuf>> {
        self.requests.lock().unwrap().iter().map(|(f, _)| f.clone()).collect()
    }
}

#[async_trait]
impl HostDebugger for SpyDebugger {
    async fn start_debugging(&self, folder: Option<&Path>, request: AttachRequest) -> crate::Result<bool> {
        self.requests
            .lock()
            .unwrap()
            .push((folder.map(Path::to_path_buf), request.clone()));

        match self.behavior {
            HostBehavior::ReportSessions => {
                self.tracker.session_started(&DebugSessionInfo::from(&request));
                Ok(true)
            }
            HostBehavior::Silent => Ok(true),
            HostBehavior::Decline => Ok(false),
        }
    }
}
