use super::attach::Attacher;
use crate::compare::applications_equal;
use crate::model::Application;
use crate::poll::TaskGuard;
use crate::reconciler::ApplicationsReceiver;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub workspace_folder: Option<PathBuf>,
    /// Only these services are attached; all attachable services when `None`.
    pub service_names: Option<Vec<String>>,
}

impl WatchOptions {
    fn includes(&self, service: &str) -> bool {
        self.service_names
            .as_ref()
            .map_or(true, |names| names.iter().any(|name| name == service))
    }
}

struct ActiveWatch {
    id: u64,
    _task: TaskGuard,
}

type Watches = Mutex<HashMap<String, ActiveWatch>>;

fn lock(watches: &Watches) -> MutexGuard<'_, HashMap<String, ActiveWatch>> {
    watches.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keeps a debugger attached to every replica of watched applications.
///
/// A watch lives until its application disappears from the snapshot stream;
/// at most one watch exists per application id.
pub struct ApplicationWatcher {
    applications: ApplicationsReceiver,
    attacher: Arc<Attacher>,
    watches: Arc<Watches>,
    next_id: AtomicU64,
}

impl ApplicationWatcher {
    pub fn new(applications: ApplicationsReceiver, attacher: Arc<Attacher>) -> Self {
        Self {
            applications,
            attacher,
            watches: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Starts watching `application_id`, replacing any existing watch for it.
    pub fn watch_application(&self, application_id: &str, options: WatchOptions) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut watches = lock(&self.watches);
        let task = TaskGuard::spawn(watch(
            application_id.to_string(),
            id,
            options,
            self.applications.clone(),
            self.attacher.clone(),
            Arc::downgrade(&self.watches),
        ));

        let replaced = watches.insert(application_id.to_string(), ActiveWatch { id, _task: task });
        if replaced.is_some() {
            tracing::debug!("Replaced watch for application {}", application_id);
        }
    }

    pub fn unwatch(&self, application_id: &str) -> bool {
        lock(&self.watches).remove(application_id).is_some()
    }

    pub fn is_watching(&self, application_id: &str) -> bool {
        lock(&self.watches).contains_key(application_id)
    }

    pub fn watched_applications(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.watches).keys().cloned().collect();
        ids.sort();
        ids
    }
}

async fn watch(
    application_id: String,
    watch_id: u64,
    options: WatchOptions,
    mut applications: ApplicationsReceiver,
    attacher: Arc<Attacher>,
    watches: Weak<Watches>,
) {
    let mut last: Option<Application> = None;

    loop {
        // None while nothing is known yet; Some(None) once the application is gone.
        let current: Option<Option<Application>> = applications
            .borrow_and_update()
            .as_ref()
            .map(|apps| apps.iter().find(|app| app.id == application_id).cloned());

        match current {
            None => {}
            Some(None) => {
                tracing::info!("Application {} stopped, releasing its watch", application_id);
                if let Some(watches) = watches.upgrade() {
                    let mut watches = lock(&watches);
                    if watches.get(&application_id).map(|w| w.id) == Some(watch_id) {
                        // Dropping our own guard aborts this task at its next await.
                        watches.remove(&application_id);
                    }
                }
                return;
            }
            Some(Some(application)) => {
                let unchanged = matches!(&last, Some(previous) if applications_equal(previous, &application));
                if !unchanged {
                    attach_all(&attacher, &application, &options).await;
                    last = Some(application);
                }
            }
        }

        if applications.changed().await.is_err() {
            return;
        }
    }
}

async fn attach_all(attacher: &Attacher, application: &Application, options: &WatchOptions) {
    let folder = options.workspace_folder.as_deref();

    let attaches = application
        .project_services()
        .filter(|service| options.includes(&service.name))
        .flat_map(|service| {
            service.replica_pids().map(move |(replica, pid)| {
                attacher.attach_to_replica(folder, service.service_type, replica, Some(pid))
            })
        });

    join_all(attaches).await;
}
