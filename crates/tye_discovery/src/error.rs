use std::time::Duration;
use thiserror::Error;
use tye_bridge_core::TyeError;

/// Failures surfaced to a caller that asked for something specific.
///
/// Background polling never produces these; it degrades to "absent" instead.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("The Tye application \"{0}\" is not running.")]
    ApplicationNotRunning(String),

    #[error("The Tye application \"{0}\" does not have any debuggable services.")]
    NoDebuggableServices(String),

    #[error("No services were set to be debugged.")]
    NoDebuggedServices,

    #[error("The Tye application \"{application}\" does not have the service \"{service}\".")]
    ServiceNotFound { application: String, service: String },

    #[error("The service \"{service}\" does not have the replica \"{replica}\".")]
    ReplicaNotFound { service: String, replica: String },

    #[error("The service \"{0}\" is not browsable.")]
    NotBrowsable(String),

    #[error("Timed out after {0:?} waiting for the application to start.")]
    WaitTimedOut(Duration),

    #[error("Unable to establish a connection to the application at {0}.")]
    NoClient(String),

    #[error("Invalid log URI: {0}")]
    InvalidLogUri(String),

    #[error("No `tye run` with pid {0} was started here.")]
    RunNotFound(u32),

    #[error("`tye run` exited before it started: {0}")]
    RunExited(String),

    #[error("Discovery has stopped")]
    DiscoveryStopped,

    #[error(transparent)]
    Client(#[from] TyeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
