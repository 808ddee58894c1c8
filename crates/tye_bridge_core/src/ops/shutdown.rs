use crate::{HttpTyeClient, Result};
use tokio_util::sync::CancellationToken;

pub async fn shut_down(client: &HttpTyeClient, cancel: &CancellationToken) -> Result<()> {
    tracing::info!("Requesting shutdown of application at {}", client.dashboard());
    client.delete(&["api", "v1", "control"], cancel).await
}
