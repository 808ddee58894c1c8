use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tye_discovery::debug::{AttachRequest, HostDebugger};

/// An attach request waiting for the editor to start the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAttach {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_folder: Option<PathBuf>,
    pub configuration: AttachRequest,
}

/// The editor's debugger, reached by polling: attach requests queue up here
/// until `tye_take_attach_requests` drains them, and the editor reports the
/// sessions it started through `tye_debug_session_event`.
#[derive(Default)]
pub struct QueuedDebugger {
    pending: Mutex<VecDeque<PendingAttach>>,
}

impl QueuedDebugger {
    pub fn take(&self) -> Vec<PendingAttach> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl HostDebugger for QueuedDebugger {
    async fn start_debugging(&self, folder: Option<&Path>, request: AttachRequest) -> tye_discovery::Result<bool> {
        tracing::info!("Queued attach to {} (pid {})", request.name, request.process_id);

        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(PendingAttach {
                workspace_folder: folder.map(Path::to_path_buf),
                configuration: request,
            });
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn requests_drain_in_order() {
        let host = QueuedDebugger::default();
        host.start_debugging(Some(Path::new("/src/shop")), AttachRequest::new("coreclr", "web_1", 4242))
            .await
            .unwrap();
        host.start_debugging(None, AttachRequest::new("coreclr", "api_1", 77))
            .await
            .unwrap();
        assert_eq!(host.len(), 2);

        let taken = host.take();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].configuration.process_id, 4242);
        assert_eq!(taken[1].configuration.process_id, 77);
        assert!(host.take().is_empty());

        let json = serde_json::to_value(&taken[0]).unwrap();
        assert_eq!(json["workspaceFolder"], "/src/shop");
        assert_eq!(json["configuration"]["type"], "coreclr");
        assert_eq!(json["configuration"]["request"], "attach");
        assert_eq!(json["configuration"]["name"], "Tye Replica: web_1");
        assert_eq!(json["configuration"]["processId"], "4242");
        assert!(serde_json::to_value(&taken[1]).unwrap().get("workspaceFolder").is_none());
    }
}
