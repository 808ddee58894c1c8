//! Tye Bridge Core
//!
//! A reusable async library for talking to the dashboard control API of a running
//! Tye application over HTTP. Provides structured config, error handling, and typed
//! operations against `/api/v1/...`.

pub mod config;
pub mod error;
pub mod client;
pub mod ops;
pub mod types;

// Re-export commonly used types
pub use config::DashboardConfig;
pub use error::TyeError;
pub use client::{http_client_provider, ClientProvider, HttpTyeClient, TyeClient};

/// Result type alias using TyeError
pub type Result<T> = std::result::Result<T, TyeError>;
