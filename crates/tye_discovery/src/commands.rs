//! One-shot operations a user asks for by name.
//!
//! Unlike the background loops these raise [`DiscoveryError`] when the named
//! application, service or replica is not there.

use crate::error::DiscoveryError;
use crate::model::{browser_url, Application};
use crate::reconciler::ApplicationsReceiver;
use crate::Result;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tye_bridge_core::{ClientProvider, TyeClient};

/// Waits for the first snapshot containing a matching application.
///
/// Fails with [`DiscoveryError::WaitTimedOut`] if none shows up in time.
pub async fn wait_for_application(
    applications: &ApplicationsReceiver,
    matches: impl Fn(&Application) -> bool,
    timeout: Duration,
) -> Result<Application> {
    let mut applications = applications.clone();

    let found = tokio::time::timeout(
        timeout,
        applications.wait_for(|snapshot| {
            snapshot
                .as_ref()
                .is_some_and(|apps| apps.iter().any(&matches))
        }),
    )
    .await;

    match found {
        Ok(Ok(snapshot)) => snapshot
            .as_ref()
            .and_then(|apps| apps.iter().find(|app| matches(app)).cloned())
            .ok_or(DiscoveryError::DiscoveryStopped),
        Ok(Err(_)) => Err(DiscoveryError::DiscoveryStopped),
        Err(_) => Err(DiscoveryError::WaitTimedOut(timeout)),
    }
}

pub fn find_application<'a>(applications: &'a [Application], application_id: &str) -> Result<&'a Application> {
    applications
        .iter()
        .find(|app| app.id == application_id)
        .ok_or_else(|| DiscoveryError::ApplicationNotRunning(application_id.to_string()))
}

fn client_for(clients: &ClientProvider, application: &Application) -> Result<Arc<dyn TyeClient>> {
    clients(&application.dashboard).ok_or_else(|| DiscoveryError::NoClient(application.dashboard.clone()))
}

pub async fn get_service_log(
    applications: &[Application],
    clients: &ClientProvider,
    application_id: &str,
    service: &str,
    cancel: &CancellationToken,
) -> Result<String> {
    let application = find_application(applications, application_id)?;
    if application.service(service).is_none() {
        return Err(DiscoveryError::ServiceNotFound {
            application: application.name.clone(),
            service: service.to_string(),
        });
    }

    let client = client_for(clients, application)?;
    Ok(client.get_log(service, cancel).await?)
}

pub async fn shutdown_application(
    applications: &[Application],
    clients: &ClientProvider,
    application_id: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let application = find_application(applications, application_id)?;
    let client = client_for(clients, application)?;

    tracing::info!("Shutting down application {} at {}", application.name, application.dashboard);
    Ok(client.shut_down(cancel).await?)
}

/// Browser URL for a replica of `service`, or its first browsable replica.
pub fn browse(
    applications: &[Application],
    application_id: &str,
    service: &str,
    replica: Option<&str>,
) -> Result<String> {
    let application = find_application(applications, application_id)?;
    let found = application
        .service(service)
        .ok_or_else(|| DiscoveryError::ServiceNotFound {
            application: application.name.clone(),
            service: service.to_string(),
        })?;

    let url = match replica {
        Some(name) => {
            let replica = found.replica(name).ok_or_else(|| DiscoveryError::ReplicaNotFound {
                service: service.to_string(),
                replica: name.to_string(),
            })?;
            browser_url(found, replica)
        }
        None => {
            let mut replicas: Vec<_> = found.replicas.values().collect();
            replicas.sort_by(|a, b| a.name.cmp(&b.name));
            replicas.into_iter().find_map(|replica| browser_url(found, replica))
        }
    };

    url.ok_or_else(|| DiscoveryError::NotBrowsable(service.to_string()))
}

/// `tye-log://logs/<applicationId>/<service>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogUri {
    pub application_id: String,
    pub service: String,
}

impl LogUri {
    pub const SCHEME: &'static str = "tye-log";

    pub fn new(application_id: &str, service: &str) -> Self {
        Self {
            application_id: application_id.to_string(),
            service: service.to_string(),
        }
    }

    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = || DiscoveryError::InvalidLogUri(uri.to_string());

        let rest = uri
            .strip_prefix(Self::SCHEME)
            .and_then(|rest| rest.strip_prefix("://logs/"))
            .ok_or_else(invalid)?;

        match rest.split('/').collect::<Vec<_>>()[..] {
            [application_id, service] if !application_id.is_empty() && !service.is_empty() => {
                Ok(Self::new(application_id, service))
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for LogUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://logs/{}/{}", Self::SCHEME, self.application_id, self.service)
    }
}

impl FromStr for LogUri {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
