use crate::{HttpTyeClient, Result};
use tokio_util::sync::CancellationToken;

pub async fn get_log(
    client: &HttpTyeClient,
    service_name: &str,
    cancel: &CancellationToken,
) -> Result<String> {
    let lines: Vec<String> = client
        .get_json(&["api", "v1", "logs", service_name], cancel)
        .await?;

    Ok(lines.join("\n"))
}
