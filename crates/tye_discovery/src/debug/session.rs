use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestMode {
    Launch,
    Attach,
}

fn pid_as_string<S: Serializer>(pid: &u32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(pid)
}

/// What gets handed to the host debugger to attach to one replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub request: RequestMode,
    pub name: String,
    #[serde(serialize_with = "pid_as_string")]
    pub process_id: u32,
}

impl AttachRequest {
    pub fn new(kind: &str, replica: &str, process_id: u32) -> Self {
        Self {
            kind: kind.to_string(),
            request: RequestMode::Attach,
            name: format!("Tye Replica: {replica}"),
            process_id,
        }
    }
}

/// A session start/end reported by the host, reduced to what tracking needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugSessionInfo {
    pub kind: String,
    pub request: Option<RequestMode>,
    pub process_id: Option<u32>,
}

impl DebugSessionInfo {
    /// Reads `request` and `processId` out of a loosely typed launch configuration.
    ///
    /// `processId` may arrive as a number or a decimal string.
    pub fn from_configuration(kind: &str, configuration: &Value) -> Self {
        let request = configuration
            .get("request")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok());

        let process_id = match configuration.get("processId") {
            Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };

        Self {
            kind: kind.to_string(),
            request,
            process_id,
        }
    }
}

impl From<&AttachRequest> for DebugSessionInfo {
    fn from(request: &AttachRequest) -> Self {
        Self {
            kind: request.kind.clone(),
            request: Some(request.request),
            process_id: Some(request.process_id),
        }
    }
}
