use crate::types::ApplicationResponse;
use crate::{HttpTyeClient, Result};
use tokio_util::sync::CancellationToken;

pub async fn get_application(
    client: &HttpTyeClient,
    cancel: &CancellationToken,
) -> Result<ApplicationResponse> {
    client.get_json(&["api", "v1", "application"], cancel).await
}
