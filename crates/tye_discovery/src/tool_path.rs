use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::OnceCell;

const TOOL_NAME: &str = "tye";

/// Resolves where the `tye` CLI lives.
///
/// A configured override always wins. Otherwise `tye --version` is run once;
/// success means the tool is on `PATH`, failure falls back to the dotnet
/// global tools directory. The probe result is cached for the provider's lifetime.
#[derive(Debug)]
pub struct ToolPathProvider {
    configured: Option<PathBuf>,
    probe: String,
    resolved: OnceCell<PathBuf>,
}

impl ToolPathProvider {
    pub fn new(configured: Option<PathBuf>) -> Self {
        Self::with_probe(configured, TOOL_NAME)
    }

    pub(crate) fn with_probe(configured: Option<PathBuf>, probe: &str) -> Self {
        Self {
            configured,
            probe: probe.to_string(),
            resolved: OnceCell::new(),
        }
    }

    pub async fn tool_path(&self) -> PathBuf {
        if let Some(configured) = &self.configured {
            return configured.clone();
        }

        self.resolved
            .get_or_init(|| async {
                let status = Command::new(&self.probe)
                    .arg("--version")
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .kill_on_drop(true)
                    .status()
                    .await;

                match status {
                    Ok(status) if status.success() => PathBuf::from(&self.probe),
                    other => {
                        tracing::debug!("{} --version unavailable: {:?}", self.probe, other);
                        global_tool_path()
                    }
                }
            })
            .await
            .clone()
    }
}

fn global_tool_path() -> PathBuf {
    let file = if cfg!(windows) { "tye.exe" } else { TOOL_NAME };

    match dirs::home_dir() {
        Some(home) => home.join(".dotnet").join("tools").join(file),
        None => PathBuf::from(file),
    }
}
