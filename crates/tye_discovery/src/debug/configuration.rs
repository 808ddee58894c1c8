use super::attach::Attacher;
use super::watcher::{ApplicationWatcher, WatchOptions};
use crate::commands::wait_for_application;
use crate::error::DiscoveryError;
use crate::model::Service;
use crate::reconciler::ApplicationsReceiver;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// A `tye` debug configuration as written in the editor's launch settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TyeDebugConfiguration {
    pub application_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<String>>,
    #[serde(default)]
    pub watch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedReplica {
    pub service: String,
    pub replica: String,
    pub pid: u32,
    /// False when the replica already had a session or the host declined.
    pub requested: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDebugSession {
    pub application_id: String,
    pub replicas: Vec<AttachedReplica>,
    pub watching: bool,
}

pub struct DebugContext<'a> {
    pub applications: &'a ApplicationsReceiver,
    pub attacher: &'a Attacher,
    pub watcher: &'a ApplicationWatcher,
    pub startup_wait: Duration,
}

/// Attaches to the services a `tye` debug configuration names.
///
/// Waits up to `startup_wait` for the application to appear, then validates
/// every requested service before any attach is issued.
pub async fn resolve_debug_configuration(
    context: &DebugContext<'_>,
    folder: Option<&Path>,
    configuration: &TyeDebugConfiguration,
) -> Result<ResolvedDebugSession> {
    let name = &configuration.application_name;

    let application = match wait_for_application(context.applications, |app| &app.name == name, context.startup_wait).await {
        Ok(application) => application,
        Err(DiscoveryError::WaitTimedOut(_)) => return Err(DiscoveryError::ApplicationNotRunning(name.clone())),
        Err(e) => return Err(e),
    };

    let mut debuggable: Vec<&str> = application.project_services().map(|s| s.name.as_str()).collect();
    if debuggable.is_empty() {
        return Err(DiscoveryError::NoDebuggableServices(name.clone()));
    }
    debuggable.sort_unstable();

    let debugged: Vec<&str> = match &configuration.services {
        Some(services) => services.iter().map(String::as_str).collect(),
        None => debuggable,
    };
    if debugged.is_empty() {
        return Err(DiscoveryError::NoDebuggedServices);
    }

    let services: Vec<&Service> = debugged
        .iter()
        .map(|service| {
            application
                .service(service)
                .filter(|s| s.service_type.is_attachable())
                .ok_or_else(|| DiscoveryError::ServiceNotFound {
                    application: name.clone(),
                    service: service.to_string(),
                })
        })
        .collect::<Result<_>>()?;

    let mut replicas = Vec::new();
    for service in services {
        let mut pids: Vec<(&str, u32)> = service.replica_pids().collect();
        pids.sort_unstable();

        for (replica, pid) in pids {
            let requested = context
                .attacher
                .attach_to_replica(folder, service.service_type, replica, Some(pid))
                .await;

            replicas.push(AttachedReplica {
                service: service.name.clone(),
                replica: replica.to_string(),
                pid,
                requested,
            });
        }
    }

    if configuration.watch {
        context.watcher.watch_application(
            &application.id,
            WatchOptions {
                workspace_folder: folder.map(Path::to_path_buf),
                service_names: configuration.services.clone(),
            },
        );
    }

    Ok(ResolvedDebugSession {
        application_id: application.id.clone(),
        replicas,
        watching: configuration.watch,
    })
}
