//! Turns dashboard candidates into canonical application snapshots.
//!
//! One background loop per reconciler; every subscriber shares its output.
//! A candidate that fails any call is left out of that tick's snapshot and
//! nothing else is affected.

use crate::candidate::{AsCandidate, DashboardCandidate};
use crate::compare::application_lists_equal;
use crate::error::DiscoveryError;
use crate::model::{Application, Replica, Service, ServiceType};
use crate::poll::{first_value, publish_distinct, SwitchLatest, TaskGuard};
use crate::Result;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tye_bridge_core::types::{ApplicationResponse, ServiceResponse};
use tye_bridge_core::ClientProvider;

pub type ApplicationsReceiver = watch::Receiver<Option<Vec<Application>>>;

#[derive(Clone)]
pub struct ApplicationReconciler {
    applications: ApplicationsReceiver,
    _task: Arc<TaskGuard>,
}

impl ApplicationReconciler {
    pub fn spawn<C: AsCandidate>(
        source: watch::Receiver<Option<Vec<C>>>,
        clients: ClientProvider,
        poll_interval: Duration,
    ) -> Self {
        let (tx, applications) = watch::channel(None);
        let task = TaskGuard::spawn(run(source, clients, poll_interval, tx));

        Self {
            applications,
            _task: Arc::new(task),
        }
    }

    /// Replays the latest snapshot to each new subscriber; `None` until the first one.
    pub fn subscribe(&self) -> ApplicationsReceiver {
        self.applications.clone()
    }

    pub async fn get_applications(&self) -> Result<Vec<Application>> {
        first_value(&self.applications)
            .await
            .ok_or(DiscoveryError::DiscoveryStopped)
    }
}

async fn run<C: AsCandidate>(
    mut source: watch::Receiver<Option<Vec<C>>>,
    clients: ClientProvider,
    poll_interval: Duration,
    tx: watch::Sender<Option<Vec<Application>>>,
) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let budget = candidate_budget(poll_interval);
    let mut fetching: SwitchLatest<Vec<Application>> = SwitchLatest::new();

    loop {
        tokio::select! {
            changed = source.changed() => {
                if changed.is_err() {
                    tracing::debug!("Candidate source stopped");
                    return;
                }
                restart(&mut fetching, &source, &clients, budget);
            }
            _ = interval.tick() => restart(&mut fetching, &source, &clients, budget),
            applications = fetching.next() => {
                let count = applications.len();
                if publish_distinct(&tx, applications, |a, b| application_lists_equal(a, b)) {
                    tracing::info!(applications = count, "Application topology changed");
                }
            }
        }
    }
}

fn restart<C: AsCandidate>(
    fetching: &mut SwitchLatest<Vec<Application>>,
    source: &watch::Receiver<Option<Vec<C>>>,
    clients: &ClientProvider,
    budget: Duration,
) {
    let candidates: Option<Vec<DashboardCandidate>> = source
        .borrow()
        .as_ref()
        .map(|found| found.iter().map(AsCandidate::candidate).collect());

    // Nothing to reconcile until the source has reported at least once.
    let Some(candidates) = candidates else {
        return;
    };

    let clients = clients.clone();
    fetching.start(move |cancel| fetch_all(candidates, clients, budget, cancel));
}

/// How long one dashboard may take per tick. It stays below the poll interval
/// so a slow dashboard is dropped from the tick instead of holding back the
/// whole snapshot until the next tick abandons it.
fn candidate_budget(poll_interval: Duration) -> Duration {
    poll_interval * 3 / 4
}

async fn fetch_all(
    candidates: Vec<DashboardCandidate>,
    clients: ClientProvider,
    budget: Duration,
    cancel: CancellationToken,
) -> Vec<Application> {
    let fetches = candidates.iter().map(|candidate| {
        let clients = &clients;
        let cancel = &cancel;
        async move {
            match tokio::time::timeout(budget, fetch_application(candidate, clients, cancel)).await {
                Ok(Ok(application)) => Some(application),
                Ok(Err(DiscoveryError::Client(e))) if e.is_transient() => {
                    tracing::trace!("Dashboard {} is not serving yet: {}", candidate.dashboard, e);
                    None
                }
                Ok(Err(e)) => {
                    tracing::debug!("Skipping dashboard {}: {}", candidate.dashboard, e);
                    None
                }
                Err(_) => {
                    tracing::debug!("Skipping dashboard {}: no answer within {:?}", candidate.dashboard, budget);
                    None
                }
            }
        }
    });

    join_all(fetches).await.into_iter().flatten().collect()
}

pub async fn fetch_application(
    candidate: &DashboardCandidate,
    clients: &ClientProvider,
    cancel: &CancellationToken,
) -> Result<Application> {
    let client = clients(&candidate.dashboard)
        .ok_or_else(|| DiscoveryError::NoClient(candidate.dashboard.clone()))?;

    let application = client.get_application(cancel).await?;
    let services = client.get_services(cancel).await?;

    Ok(shape_application(candidate, application, services))
}

/// Builds the canonical snapshot, dropping services of unknown type.
///
/// Identity falls back from the reported id to the discovery pid, then the
/// reported name, then the dashboard itself.
pub fn shape_application(
    candidate: &DashboardCandidate,
    response: ApplicationResponse,
    services: Vec<ServiceResponse>,
) -> Application {
    let name = response.name.filter(|name| !name.is_empty());

    let id = response
        .id
        .filter(|id| !id.is_empty())
        .or_else(|| candidate.pid.map(|pid| pid.to_string()))
        .or_else(|| name.clone())
        .unwrap_or_else(|| candidate.dashboard.clone());

    let name = name
        .or_else(|| candidate.name_hint.clone())
        .unwrap_or_else(|| "application".to_string());

    Application {
        id,
        name,
        dashboard: candidate.dashboard.clone(),
        pid: candidate.pid,
        services: services
            .into_iter()
            .filter_map(shape_service)
            .map(|service| (service.name.clone(), service))
            .collect(),
    }
}

fn shape_service(response: ServiceResponse) -> Option<Service> {
    let name = response.description.name;

    let service_type = match response.service_type.parse::<ServiceType>() {
        Ok(service_type) => service_type,
        Err(e) => {
            tracing::trace!("Ignoring service {}: {}", name, e);
            return None;
        }
    };

    let replicas: HashMap<String, Replica> = response
        .replicas
        .into_iter()
        .map(|(key, replica)| {
            let replica = Replica {
                name: if replica.name.is_empty() { key.clone() } else { replica.name },
                pid: replica.pid,
                environment: replica
                    .environment
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|(key, value)| Some((key, value?)))
                    .collect(),
                ports: replica.ports.unwrap_or_default(),
            };
            (key, replica)
        })
        .collect();

    Some(Service {
        name,
        service_type,
        replicas,
    })
}
