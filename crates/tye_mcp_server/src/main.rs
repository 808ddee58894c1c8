mod host;

use host::QueuedDebugger;
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters, ServerHandler},
    model::*,
    tool, tool_handler, tool_router, transport, ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tye_bridge_core::DashboardConfig;
use tye_discovery::commands::LogUri;
use tye_discovery::debug::{DebugSessionInfo, TyeDebugConfiguration, WatchOptions};
use tye_discovery::shutdown::StopOutcome;
use tye_discovery::{DiscoveryConfig, DiscoveryError, TyeContext};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ListApplicationsParams {}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ServiceLogParams {
    application_id: String,
    service: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ApplicationParams {
    application_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct BrowseServiceParams {
    application_id: String,
    service: String,
    replica: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct WatchApplicationParams {
    application_id: String,
    workspace_folder: Option<String>,
    services: Option<Vec<String>>,
    /// Stop watching instead of starting.
    #[serde(default)]
    stop: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct ResolveDebugConfigurationParams {
    application_name: String,
    services: Option<Vec<String>>,
    #[serde(default)]
    watch: bool,
    workspace_folder: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
enum SessionEvent {
    Started,
    Ended,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct DebugSessionEventParams {
    event: SessionEvent,
    /// Debugger type of the session, e.g. `coreclr`.
    session_type: String,
    /// The session's launch configuration as the editor reports it.
    configuration: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct RunApplicationParams {
    /// Folder holding the `tye.yaml` to run.
    workspace_folder: String,
    /// Extra arguments passed after `tye run`.
    #[serde(default)]
    args: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct StopRunParams {
    pid: u32,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct TakeAttachRequestsParams {}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
struct IsAttachedParams {
    pid: u32,
}

fn to_mcp_error(e: DiscoveryError) -> McpError {
    match e {
        DiscoveryError::Client(_)
        | DiscoveryError::Io(_)
        | DiscoveryError::RunExited(_)
        | DiscoveryError::DiscoveryStopped => {
            McpError::internal_error(e.to_string(), None)
        }
        _ => McpError::invalid_params(e.to_string(), None),
    }
}

#[derive(Clone)]
struct TyeMcpServer {
    tool_router: ToolRouter<Self>,
    context: Arc<TyeContext>,
    host: Arc<QueuedDebugger>,
}

#[tool_router]
impl TyeMcpServer {
    fn new(context: TyeContext, host: Arc<QueuedDebugger>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            context: Arc::new(context),
            host,
        }
    }

    #[tool(description = "List running Tye applications with their services and replicas")]
    async fn tye_list_applications(&self, _params: Parameters<ListApplicationsParams>) -> Result<CallToolResult, McpError> {
        let applications = self.context.get_applications().await.map_err(to_mcp_error)?;

        Ok(CallToolResult::structured(json!({
            "applications": applications
        })))
    }

    #[tool(description = "Fetch the log of one service of a running Tye application")]
    async fn tye_get_service_log(&self, params: Parameters<ServiceLogParams>) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let log = self
            .context
            .get_service_log(&params.application_id, &params.service)
            .await
            .map_err(to_mcp_error)?;

        Ok(CallToolResult::structured(json!({
            "uri": LogUri::new(&params.application_id, &params.service).to_string(),
            "log": log
        })))
    }

    #[tool(description = "Ask a running Tye application to shut down")]
    async fn tye_shutdown_application(&self, params: Parameters<ApplicationParams>) -> Result<CallToolResult, McpError> {
        self.context
            .shutdown_application(&params.0.application_id)
            .await
            .map_err(to_mcp_error)?;

        Ok(CallToolResult::structured(json!({
            "application_id": params.0.application_id,
            "shutdown_requested": true
        })))
    }

    #[tool(description = "Start `tye run` in a workspace folder")]
    async fn tye_run_application(&self, params: Parameters<RunApplicationParams>) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let pid = self
            .context
            .run_application(&PathBuf::from(&params.workspace_folder), &params.args)
            .await
            .map_err(to_mcp_error)?;

        Ok(CallToolResult::structured(json!({
            "pid": pid,
            "running": self.context.launched_runs().await
        })))
    }

    #[tool(description = "Stop a `tye run` started by tye_run_application, terminating it if it does not exit in time")]
    async fn tye_stop_run(&self, params: Parameters<StopRunParams>) -> Result<CallToolResult, McpError> {
        let outcome = self.context.stop_run(params.0.pid).await.map_err(to_mcp_error)?;
        let (terminated, status) = match outcome {
            StopOutcome::Exited(status) => (false, status),
            StopOutcome::Terminated(status) => (true, status),
        };

        Ok(CallToolResult::structured(json!({
            "pid": params.0.pid,
            "terminated": terminated,
            "exit_code": status.code()
        })))
    }

    #[tool(description = "Resolve the browser URL of a service replica")]
    async fn tye_browse_service(&self, params: Parameters<BrowseServiceParams>) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let url = self
            .context
            .browse(&params.application_id, &params.service, params.replica.as_deref())
            .await
            .map_err(to_mcp_error)?;

        Ok(CallToolResult::structured(json!({ "url": url })))
    }

    #[tool(description = "Attach to new replicas of an application as they appear, until it stops")]
    async fn tye_watch_application(&self, params: Parameters<WatchApplicationParams>) -> Result<CallToolResult, McpError> {
        let params = params.0;

        if params.stop {
            let stopped = self.context.watcher().unwatch(&params.application_id);
            return Ok(CallToolResult::structured(json!({
                "application_id": params.application_id,
                "watching": false,
                "stopped": stopped
            })));
        }

        self.context.watch_application(
            &params.application_id,
            WatchOptions {
                workspace_folder: params.workspace_folder.map(PathBuf::from),
                service_names: params.services,
            },
        );

        Ok(CallToolResult::structured(json!({
            "application_id": params.application_id,
            "watching": true,
            "watched_applications": self.context.watcher().watched_applications()
        })))
    }

    #[tool(description = "Resolve a `tye` debug configuration: attach to the named application's services")]
    async fn tye_resolve_debug_configuration(
        &self,
        params: Parameters<ResolveDebugConfigurationParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let folder = params.workspace_folder.map(PathBuf::from);
        let configuration = TyeDebugConfiguration {
            application_name: params.application_name,
            services: params.services,
            watch: params.watch,
        };

        let resolved = self
            .context
            .resolve_debug_configuration(folder.as_deref(), &configuration)
            .await
            .map_err(to_mcp_error)?;

        Ok(CallToolResult::structured(json!({
            "session": resolved,
            "pending_attach_requests": self.host.len()
        })))
    }

    #[tool(description = "Report a debug session start or end observed in the editor")]
    async fn tye_debug_session_event(&self, params: Parameters<DebugSessionEventParams>) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let session = DebugSessionInfo::from_configuration(&params.session_type, &params.configuration);

        let tracked = match params.event {
            SessionEvent::Started => self.context.session_started(&session),
            SessionEvent::Ended => self.context.session_ended(&session),
        };

        Ok(CallToolResult::structured(json!({
            "tracked": tracked,
            "process_id": session.process_id
        })))
    }

    #[tool(description = "Take the attach requests waiting for the editor to start debug sessions")]
    async fn tye_take_attach_requests(
        &self,
        _params: Parameters<TakeAttachRequestsParams>,
    ) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::structured(json!({
            "requests": self.host.take()
        })))
    }

    #[tool(description = "Check whether a debugger session is attached to a process")]
    async fn tye_is_attached(&self, params: Parameters<IsAttachedParams>) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::structured(json!({
            "pid": params.0.pid,
            "attached": self.context.is_attached(params.0.pid)
        })))
    }
}

#[tool_handler]
impl ServerHandler for TyeMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Tye MCP Server: discovers running Tye applications and queues debugger attach requests for their replicas"
                    .into(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the MCP transport.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = DiscoveryConfig::from_env();
    tracing::info!(
        "Discovery mode {:?}, polling every {:?}",
        config.mode,
        config.poll_interval
    );

    let host = Arc::new(QueuedDebugger::default());
    let context = TyeContext::start(config, DashboardConfig::from_env(), host.clone());
    let server = TyeMcpServer::new(context, host);

    tracing::info!("Starting Tye MCP Server on stdio...");

    server.serve(transport::stdio()).await?.waiting().await?;

    Ok(())
}
