use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TyeError {
    #[error("Connection error: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error {status} from {url}")]
    Http { status: u16, url: String },

    #[error("Deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unsupported dashboard scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid dashboard URL: {0}")]
    InvalidUrl(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl TyeError {
    pub fn http(status: reqwest::StatusCode, url: impl Into<String>) -> Self {
        Self::Http {
            status: status.as_u16(),
            url: url.into(),
        }
    }

    /// True for failures that only mean "nothing is serving here yet".
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Timeout(_) | Self::Cancelled => true,
            Self::Http { status, .. } => *status == 404 || *status >= 500,
            _ => false,
        }
    }
}
