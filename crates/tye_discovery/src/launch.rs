use crate::error::DiscoveryError;
use crate::shutdown::{shutdown_then_terminate, StopOutcome};
use crate::Result;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tye_bridge_core::TyeClient;

/// `tye run` processes started from here, keyed by pid.
#[derive(Default)]
pub struct Launcher {
    runs: Mutex<HashMap<u32, Child>>,
}

impl Launcher {
    /// Starts `<tool> run [args]` in `folder`; its output is forwarded to the log.
    pub async fn run(&self, tool_path: &Path, folder: &Path, args: &[String]) -> Result<u32> {
        let mut child = Command::new(tool_path)
            .arg("run")
            .args(args)
            .current_dir(folder)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let Some(pid) = child.id() else {
            let status = child.wait().await?;
            return Err(DiscoveryError::RunExited(status.to_string()));
        };

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(pid, stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(pid, stderr));
        }

        tracing::info!("Started {} run in {} (pid {})", tool_path.display(), folder.display(), pid);
        self.runs.lock().await.insert(pid, child);
        Ok(pid)
    }

    /// Pids of launched runs that are still alive.
    pub async fn running(&self) -> Vec<u32> {
        let mut runs = self.runs.lock().await;
        runs.retain(|pid, child| match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::info!("Run {} exited with {}", pid, status);
                false
            }
            Err(e) => {
                tracing::warn!("Unable to check run {}: {}", pid, e);
                false
            }
        });

        let mut pids: Vec<u32> = runs.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    pub async fn stop(&self, pid: u32, client: Option<&dyn TyeClient>, timeout: Duration) -> Result<StopOutcome> {
        let mut child = self
            .runs
            .lock()
            .await
            .remove(&pid)
            .ok_or(DiscoveryError::RunNotFound(pid))?;

        shutdown_then_terminate(&mut child, client, timeout).await
    }
}

async fn forward_output(pid: u32, stream: impl AsyncRead + Unpin) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::info!(target: "tye::run", pid, "{}", line);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::MockClients;

    fn workspace(name: &str, script: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("tye-launch-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        // `sh run` executes this file in place of a real `tye run`.
        std::fs::write(dir.join("run"), script).unwrap();
        dir
    }

    #[tokio::test]
    async fn stuck_run_is_terminated_and_forgotten() {
        let dir = workspace("stuck", "echo started\nsleep 30\n");
        let launcher = Launcher::default();

        let pid = launcher.run(Path::new("sh"), &dir, &[]).await.unwrap();
        assert_eq!(launcher.running().await, vec![pid]);

        let outcome = launcher.stop(pid, None, Duration::from_millis(100)).await.unwrap();
        assert!(matches!(outcome, StopOutcome::Terminated(_)));
        assert!(launcher.running().await.is_empty());
        assert!(matches!(
            launcher.stop(pid, None, Duration::from_millis(100)).await,
            Err(DiscoveryError::RunNotFound(p)) if p == pid
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn run_asked_to_shut_down_exits_on_its_own() {
        let dir = workspace("graceful", "sleep 0.2\n");
        let launcher = Launcher::default();
        let clients = MockClients::new();
        clients.add_dashboard("http://localhost:8000", "1", "app", vec![]);
        let client = (clients.provider())("http://localhost:8000").unwrap();

        let pid = launcher.run(Path::new("sh"), &dir, &[]).await.unwrap();
        let outcome = launcher
            .stop(pid, Some(client.as_ref()), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(matches!(outcome, StopOutcome::Exited(status) if status.success()));
        assert_eq!(clients.calls("http://localhost:8000"), vec!["shutdown"]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn finished_runs_drop_out_of_the_list() {
        let dir = workspace("finished", "exit 0\n");
        let launcher = Launcher::default();

        let pid = launcher.run(Path::new("sh"), &dir, &[]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(!launcher.running().await.contains(&pid));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_folder_is_an_io_error() {
        let launcher = Launcher::default();
        let missing = std::env::temp_dir().join("tye-launch-missing-folder");

        assert!(matches!(
            launcher.run(Path::new("sh"), &missing, &[]).await,
            Err(DiscoveryError::Io(_))
        ));
    }
}
