//! Canonical application / service / replica snapshots.
//!
//! Snapshots are built fresh on every reconciliation tick and handed out
//! read-only; nothing mutates a published snapshot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    External,
    Project,
    Executable,
    Container,
    Function,
    Ingress,
}

impl ServiceType {
    pub const ALL: [ServiceType; 6] = [
        ServiceType::External,
        ServiceType::Project,
        ServiceType::Executable,
        ServiceType::Container,
        ServiceType::Function,
        ServiceType::Ingress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::External => "external",
            ServiceType::Project => "project",
            ServiceType::Executable => "executable",
            ServiceType::Container => "container",
            ServiceType::Function => "function",
            ServiceType::Ingress => "ingress",
        }
    }

    /// Services a debugger can attach to.
    pub fn is_attachable(self) -> bool {
        matches!(self, ServiceType::Project | ServiceType::Function)
    }

    /// The reported pid belongs to a host process; the debuggable runtime is one of its children.
    pub fn needs_attach_indirection(self) -> bool {
        matches!(self, ServiceType::Function)
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown service type '{0}'")]
pub struct UnknownServiceType(pub String);

impl FromStr for ServiceType {
    type Err = UnknownServiceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServiceType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownServiceType(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub name: String,
    /// `None` until the orchestrator reports it; not yet attachable.
    pub pid: Option<u32>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub ports: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub service_type: ServiceType,
    pub replicas: HashMap<String, Replica>,
}

impl Service {
    pub fn replica(&self, name: &str) -> Option<&Replica> {
        self.replicas.get(name)
    }

    /// Replica names and pids, skipping replicas whose pid is not yet known.
    pub fn replica_pids(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.replicas
            .values()
            .filter_map(|replica| replica.pid.map(|pid| (replica.name.as_str(), pid)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub name: String,
    pub dashboard: String,
    pub pid: Option<u32>,
    pub services: HashMap<String, Service>,
}

impl Application {
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    /// Services whose replicas a debugger can attach to.
    pub fn project_services(&self) -> impl Iterator<Item = &Service> + '_ {
        self.services
            .values()
            .filter(|service| service.service_type.is_attachable())
    }

    pub fn replica_pid(&self, service: &str, replica: &str) -> Option<u32> {
        self.service(service)?.replica(replica)?.pid
    }
}

fn service_env_key(service: &Service, suffix: &str) -> String {
    format!("service__{}__{}", service.name, suffix).to_uppercase()
}

pub fn is_browsable(service: &Service, replica: &Replica) -> bool {
    if !replica.environment.is_empty() {
        return replica
            .environment
            .contains_key(&service_env_key(service, "host"));
    }

    service.service_type == ServiceType::Ingress
}

/// Where a browser should go for this replica, preferring the same
/// `SERVICE__<NAME>__*` variables the service's own clients resolve.
pub fn browser_url(service: &Service, replica: &Replica) -> Option<String> {
    if !is_browsable(service, replica) {
        return None;
    }

    if let Some(host) = replica.environment.get(&service_env_key(service, "host")) {
        let port = replica
            .environment
            .get(&service_env_key(service, "port"))
            .cloned()
            .or_else(|| replica.ports.first().map(u16::to_string))?;
        let protocol = replica
            .environment
            .get(&service_env_key(service, "protocol"))
            .map(String::as_str)
            .unwrap_or("http");

        return Some(format!("{protocol}://{host}:{port}"));
    }

    let port = replica.ports.first()?;
    Some(format!("http://localhost:{port}"))
}
