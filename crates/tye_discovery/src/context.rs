use crate::commands::{self, LogUri};
use crate::config::{DiscoveryConfig, DiscoveryMode};
use crate::debug::{
    resolve_debug_configuration, ApplicationWatcher, Attacher, DebugContext, DebugSessionInfo,
    DebugSessionTracker, HostDebugger, ResolvedDebugSession, TyeDebugConfiguration, WatchOptions,
};
use crate::error::DiscoveryError;
use crate::launch::Launcher;
use crate::mdns::MdnsBrowser;
use crate::model::Application;
use crate::ports::{PortLister, SystemPortLister};
use crate::process::{ProcessEnumerator, SystemProcessEnumerator};
use crate::process_provider::{ProcessProvider, ProcessSources, TyeProcess};
use crate::reconciler::{ApplicationReconciler, ApplicationsReceiver};
use crate::shutdown::StopOutcome;
use crate::tool_path::ToolPathProvider;
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tye_bridge_core::{http_client_provider, ClientProvider, DashboardConfig};

/// How long explicit requests wait for a named application to show up.
pub const STARTUP_WAIT: Duration = Duration::from_secs(10);

enum Discovery {
    Processes(ProcessProvider),
    Mdns(MdnsBrowser),
}

/// Everything discovery needs, built once at startup and shared by handle.
pub struct TyeContext {
    config: DiscoveryConfig,
    clients: ClientProvider,
    tool_path: Arc<ToolPathProvider>,
    discovery: Discovery,
    reconciler: ApplicationReconciler,
    tracker: Arc<DebugSessionTracker>,
    attacher: Arc<Attacher>,
    watcher: ApplicationWatcher,
    launcher: Launcher,
}

impl TyeContext {
    /// Wires the OS-backed enumerator, port lister and HTTP dashboard client.
    pub fn start(config: DiscoveryConfig, dashboard: DashboardConfig, host: Arc<dyn HostDebugger>) -> Self {
        Self::with_parts(
            config,
            http_client_provider(dashboard),
            Arc::new(SystemProcessEnumerator::new()),
            Arc::new(SystemPortLister::new()),
            host,
        )
    }

    pub fn with_parts(
        config: DiscoveryConfig,
        clients: ClientProvider,
        enumerator: Arc<dyn ProcessEnumerator>,
        ports: Arc<dyn PortLister>,
        host: Arc<dyn HostDebugger>,
    ) -> Self {
        let tool_path = Arc::new(ToolPathProvider::new(config.tye_path.clone()));

        let (discovery, reconciler) = match config.mode {
            DiscoveryMode::Process => {
                let provider = ProcessProvider::spawn(
                    ProcessSources {
                        tool_path: tool_path.clone(),
                        enumerator: enumerator.clone(),
                        ports,
                        clients: clients.clone(),
                    },
                    config.poll_interval,
                );
                let reconciler =
                    ApplicationReconciler::spawn(provider.processes(), clients.clone(), config.poll_interval);
                (Discovery::Processes(provider), reconciler)
            }
            DiscoveryMode::Mdns => {
                let browser = MdnsBrowser::spawn(&config.mdns_service_type);
                let reconciler =
                    ApplicationReconciler::spawn(browser.services(), clients.clone(), config.poll_interval);
                (Discovery::Mdns(browser), reconciler)
            }
        };

        tracing::info!(mode = ?config.mode, "Tye discovery started");

        let tracker = Arc::new(DebugSessionTracker::new(config.debugger_kind.clone()));
        let attacher = Arc::new(Attacher::new(
            tracker.clone(),
            host,
            enumerator,
            config.function_host_patterns.clone(),
        ));
        let watcher = ApplicationWatcher::new(reconciler.subscribe(), attacher.clone());

        Self {
            config,
            clients,
            tool_path,
            discovery,
            reconciler,
            tracker,
            attacher,
            watcher,
            launcher: Launcher::default(),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn clients(&self) -> &ClientProvider {
        &self.clients
    }

    pub async fn tool_path(&self) -> PathBuf {
        self.tool_path.tool_path().await
    }

    pub fn applications(&self) -> ApplicationsReceiver {
        self.reconciler.subscribe()
    }

    pub async fn get_applications(&self) -> Result<Vec<Application>> {
        self.reconciler.get_applications().await
    }

    /// Orchestrator processes found through the process table; empty under mDNS.
    pub async fn get_processes(&self) -> Result<Vec<TyeProcess>> {
        match &self.discovery {
            Discovery::Processes(provider) => provider.get_processes().await,
            Discovery::Mdns(_) => Ok(Vec::new()),
        }
    }

    pub async fn wait_for_application(&self, application_id: &str, timeout: Duration) -> Result<Application> {
        commands::wait_for_application(&self.applications(), |app| app.id == application_id, timeout).await
    }

    pub async fn get_service_log(&self, application_id: &str, service: &str) -> Result<String> {
        let applications = self.get_applications().await?;
        commands::get_service_log(&applications, &self.clients, application_id, service, &CancellationToken::new())
            .await
    }

    pub async fn get_log_document(&self, uri: &str) -> Result<String> {
        let uri = LogUri::parse(uri)?;
        self.get_service_log(&uri.application_id, &uri.service).await
    }

    pub async fn shutdown_application(&self, application_id: &str) -> Result<()> {
        let applications = self.get_applications().await?;
        commands::shutdown_application(&applications, &self.clients, application_id, &CancellationToken::new())
            .await
    }

    /// Starts `tye run` in `folder` with the resolved tool path.
    pub async fn run_application(&self, folder: &Path, args: &[String]) -> Result<u32> {
        let tool_path = self.tool_path().await;
        self.launcher.run(&tool_path, folder, args).await
    }

    pub async fn launched_runs(&self) -> Vec<u32> {
        self.launcher.running().await
    }

    /// Stops a run started by `run_application`. Its dashboard is asked to
    /// shut down first when discovery has already found it.
    pub async fn stop_run(&self, pid: u32) -> Result<StopOutcome> {
        let dashboard = self.reconciler.subscribe().borrow().as_ref().and_then(|applications| {
            applications
                .iter()
                .find(|application| application.pid == Some(pid))
                .map(|application| application.dashboard.clone())
        });
        let client = dashboard.and_then(|dashboard| (self.clients)(&dashboard));

        self.launcher
            .stop(pid, client.as_deref(), self.config.shutdown_timeout)
            .await
    }

    pub async fn browse(&self, application_id: &str, service: &str, replica: Option<&str>) -> Result<String> {
        let applications = self.get_applications().await?;
        commands::browse(&applications, application_id, service, replica)
    }

    pub async fn resolve_debug_configuration(
        &self,
        folder: Option<&Path>,
        configuration: &TyeDebugConfiguration,
    ) -> Result<ResolvedDebugSession> {
        let applications = self.applications();
        let context = DebugContext {
            applications: &applications,
            attacher: &self.attacher,
            watcher: &self.watcher,
            startup_wait: STARTUP_WAIT,
        };
        resolve_debug_configuration(&context, folder, configuration).await
    }

    pub async fn attach_to_replica(&self, application_id: &str, service: &str, replica: &str) -> Result<bool> {
        let applications = self.get_applications().await?;
        let application = commands::find_application(&applications, application_id)?;
        let found = application.service(service).ok_or_else(|| DiscoveryError::ServiceNotFound {
            application: application.name.clone(),
            service: service.to_string(),
        })?;
        let pid = found.replica(replica).map(|r| r.pid).ok_or_else(|| DiscoveryError::ReplicaNotFound {
            service: service.to_string(),
            replica: replica.to_string(),
        })?;

        Ok(self.attacher.attach_to_replica(None, found.service_type, replica, pid).await)
    }

    pub fn watch_application(&self, application_id: &str, options: WatchOptions) {
        self.watcher.watch_application(application_id, options);
    }

    pub fn watcher(&self) -> &ApplicationWatcher {
        &self.watcher
    }

    pub fn session_started(&self, session: &DebugSessionInfo) -> bool {
        self.tracker.session_started(session)
    }

    pub fn session_ended(&self, session: &DebugSessionInfo) -> bool {
        self.tracker.session_ended(session)
    }

    pub fn is_attached(&self, pid: u32) -> bool {
        self.tracker.is_attached(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::RequestMode;
    use crate::testing::{service_response, MockClients, MockEnumerator, MockPorts, SpyDebugger};

    fn context(clients: &MockClients, host: &SpyDebugger) -> TyeContext {
        let config = DiscoveryConfig {
            tye_path: Some(PathBuf::from("tye")),
            ..DiscoveryConfig::default()
        };
        TyeContext::with_parts(
            config,
            clients.provider(),
            Arc::new(MockEnumerator::with_processes(&[(100, "tye")])),
            Arc::new(MockPorts::new(&[(100, &[8000])])),
            Arc::new(host.clone()),
        )
    }

    #[tokio::test]
    async fn discovered_replica_attaches_exactly_once() {
        let clients = MockClients::new();
        clients.add_dashboard(
            "http://localhost:8000",
            "1",
            "app",
            vec![service_response("web", "project", &[("web_1", Some(4242), &[5000])])],
        );
        let host = SpyDebugger::silent("coreclr");
        let tye = context(&clients, &host);

        let applications = tye.get_applications().await.unwrap();
        assert_eq!(applications.len(), 1);
        let app = &applications[0];
        assert_eq!(app.id, "1");
        assert_eq!(app.pid, Some(100));
        assert_eq!(app.project_services().count(), 1);
        assert_eq!(app.replica_pid("web", "web_1"), Some(4242));

        assert!(tye.attach_to_replica("1", "web", "web_1").await.unwrap());
        assert!(!tye.attach_to_replica("1", "web", "web_1").await.unwrap());

        let requests = host.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(serde_json::to_value(&requests[0]).unwrap()["processId"], "4242");

        // The editor reports the session through the context.
        let session = DebugSessionInfo {
            kind: "coreclr".into(),
            request: Some(RequestMode::Attach),
            process_id: Some(4242),
        };
        assert!(tye.session_started(&session));
        assert!(tye.is_attached(4242));
        assert!(tye.session_ended(&session));
        assert!(!tye.is_attached(4242));
    }

    #[tokio::test]
    async fn commands_resolve_through_discovered_dashboards() {
        let clients = MockClients::new();
        clients.add_dashboard(
            "http://localhost:8000",
            "1",
            "app",
            vec![service_response("web", "project", &[("web_1", Some(4242), &[5000])])],
        );
        clients.set_log("http://localhost:8000", "web", "ready");
        let tye = context(&clients, &SpyDebugger::silent("coreclr"));

        assert_eq!(tye.get_processes().await.unwrap(), vec![TyeProcess { pid: 100, dashboard_port: 8000 }]);
        assert_eq!(tye.get_log_document("tye-log://logs/1/web").await.unwrap(), "ready");
        assert!(matches!(
            tye.attach_to_replica("1", "web", "web_9").await,
            Err(DiscoveryError::ReplicaNotFound { .. })
        ));
        assert!(matches!(
            tye.shutdown_application("2").await,
            Err(DiscoveryError::ApplicationNotRunning(_))
        ));
        tye.shutdown_application("1").await.unwrap();
        assert_eq!(tye.tool_path().await, PathBuf::from("tye"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launched_run_stops_within_the_shutdown_timeout() {
        let dir = std::env::temp_dir().join(format!("tye-context-run-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("run"), "sleep 30\n").unwrap();

        let config = DiscoveryConfig {
            tye_path: Some(PathBuf::from("sh")),
            shutdown_timeout: Duration::from_millis(100),
            ..DiscoveryConfig::default()
        };
        let tye = TyeContext::with_parts(
            config,
            MockClients::new().provider(),
            Arc::new(MockEnumerator::default()),
            Arc::new(MockPorts::default()),
            Arc::new(SpyDebugger::silent("coreclr")),
        );

        let pid = tye.run_application(&dir, &["--port".to_string(), "0".to_string()]).await.unwrap();
        assert_eq!(tye.launched_runs().await, vec![pid]);

        let outcome = tokio::time::timeout(Duration::from_secs(5), tye.stop_run(pid))
            .await
            .expect("stop is bounded by the shutdown timeout")
            .unwrap();
        assert!(matches!(outcome, StopOutcome::Terminated(_)));
        assert!(tye.launched_runs().await.is_empty());
        assert!(matches!(tye.stop_run(pid).await, Err(DiscoveryError::RunNotFound(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
