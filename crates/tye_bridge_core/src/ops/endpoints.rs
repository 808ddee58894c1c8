use crate::{HttpTyeClient, Result, TyeError};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Liveness probe: a Tye dashboard answers `GET /api/v1` with a list of endpoint URLs.
pub async fn get_endpoints(client: &HttpTyeClient, cancel: &CancellationToken) -> Result<Vec<String>> {
    let result: Value = client.get_json(&["api", "v1"], cancel).await?;

    let endpoints = result
        .as_array()
        .ok_or_else(|| TyeError::InvalidResponse("Expected array from /api/v1".into()))?;

    Ok(endpoints
        .iter()
        .filter_map(|endpoint| endpoint.as_str().map(str::to_string))
        .collect())
}
