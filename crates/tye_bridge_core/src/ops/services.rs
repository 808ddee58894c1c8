use crate::types::ServiceResponse;
use crate::{HttpTyeClient, Result};
use tokio_util::sync::CancellationToken;

pub async fn get_services(
    client: &HttpTyeClient,
    cancel: &CancellationToken,
) -> Result<Vec<ServiceResponse>> {
    client.get_json(&["api", "v1", "services"], cancel).await
}
