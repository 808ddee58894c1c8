use crate::Result;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tye_bridge_core::TyeClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The process exited by itself within the timeout.
    Exited(ExitStatus),
    /// The process tree had to be terminated.
    Terminated(ExitStatus),
}

/// Stops a launched `tye run`: asks its dashboard to shut the application
/// down, waits up to `timeout`, then terminates the process tree.
pub async fn shutdown_then_terminate(
    child: &mut Child,
    client: Option<&dyn TyeClient>,
    timeout: Duration,
) -> Result<StopOutcome> {
    if let Some(client) = client {
        let cancel = CancellationToken::new();
        match tokio::time::timeout(timeout, client.shut_down(&cancel)).await {
            Ok(Ok(())) => tracing::debug!("Requested shutdown through {}", client.dashboard()),
            Ok(Err(e)) => tracing::warn!("Shutdown request to {} failed: {}", client.dashboard(), e),
            Err(_) => {
                cancel.cancel();
                tracing::warn!("Shutdown request to {} timed out", client.dashboard());
            }
        }
    }

    if let Ok(status) = tokio::time::timeout(timeout, child.wait()).await {
        return Ok(StopOutcome::Exited(status?));
    }

    if let Some(pid) = child.id() {
        terminate_tree(pid).await;
    }

    Ok(StopOutcome::Terminated(child.wait().await?))
}

async fn terminate_tree(pid: u32) {
    let pid = pid.to_string();

    let status = if cfg!(windows) {
        Command::new("taskkill")
            .args(["/pid", &pid, "/t", "/f"])
            .status()
            .await
    } else {
        Command::new("kill").arg(&pid).status().await
    };

    match status {
        Ok(status) if status.success() => tracing::info!("Terminated process {}", pid),
        Ok(status) => tracing::warn!("Terminating process {} exited with {}", pid, status),
        Err(e) => tracing::warn!("Unable to terminate process {}: {}", pid, e),
    }
}
