//! Tye Discovery
//!
//! Finds running Tye applications on this machine, keeps a live, deduplicated
//! view of their services and replicas, and drives debugger attachment to the
//! replica processes as they come and go.

pub mod candidate;
pub mod commands;
pub mod compare;
pub mod config;
pub mod context;
pub mod debug;
pub mod error;
pub mod launch;
pub mod mdns;
pub mod model;
pub mod ports;
pub mod process;
pub mod process_provider;
pub mod reconciler;
pub mod shutdown;
pub mod tool_path;

mod poll;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use candidate::{AsCandidate, DashboardCandidate};
pub use config::{DiscoveryConfig, DiscoveryMode};
pub use context::TyeContext;
pub use error::DiscoveryError;
pub use model::{Application, Replica, Service, ServiceType};
pub use process_provider::{ProcessProvider, TyeProcess};
pub use reconciler::{ApplicationReconciler, ApplicationsReceiver};

/// Result type alias using DiscoveryError
pub type Result<T> = std::result::Result<T, DiscoveryError>;
