//! Wire shapes returned by the dashboard's `/api/v1` control API.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `GET /api/v1/application`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDescription {
    pub name: String,
}

/// One element of `GET /api/v1/services`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse {
    pub description: ServiceDescription,
    #[serde(default)]
    pub replicas: HashMap<String, ReplicaResponse>,
    pub service_type: String,
    #[serde(default)]
    pub service_source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaResponse {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pid: Option<u32>,
    /// Values may be `null` for variables declared without one.
    #[serde(default)]
    pub environment: Option<HashMap<String, Option<String>>>,
    #[serde(default)]
    pub ports: Option<Vec<u16>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_services_payload_shape() {
        let payload = json!([
            {
                "description": { "name": "web", "replicas": 1, "bindings": [] },
                "replicas": {
                    "web_1": {
                        "name": "web_1",
                        "pid": 4242,
                        "environment": { "SERVICE__WEB__HOST": "localhost" },
                        "ports": [5000]
                    },
                    "web_2": { "name": "web_2", "environment": null }
                },
                "serviceType": "project",
                "serviceSource": "Configuration",
                "restarts": 0
            }
        ]);

        let services: Vec<ServiceResponse> = serde_json::from_value(payload).unwrap();
        assert_eq!(services.len(), 1);

        let web = &services[0];
        assert_eq!(web.description.name, "web");
        assert_eq!(web.service_type, "project");
        assert_eq!(web.service_source.as_deref(), Some("Configuration"));
        assert_eq!(web.replicas["web_1"].pid, Some(4242));
        assert_eq!(web.replicas["web_1"].ports, Some(vec![5000]));
        assert_eq!(web.replicas["web_2"].pid, None);
        assert!(web.replicas["web_2"].environment.is_none());
    }

    #[test]
    fn test_null_environment_value_decodes() {
        let services: Vec<ServiceResponse> = serde_json::from_value(json!([
            {
                "description": { "name": "web" },
                "replicas": {
                    "web_1": {
                        "name": "web_1",
                        "environment": { "SERVICE__WEB__HOST": "localhost", "ASPNETCORE_URLS": null }
                    }
                },
                "serviceType": "project"
            }
        ]))
        .unwrap();

        let environment = services[0].replicas["web_1"].environment.as_ref().unwrap();
        assert_eq!(environment["SERVICE__WEB__HOST"].as_deref(), Some("localhost"));
        assert_eq!(environment["ASPNETCORE_URLS"], None);
    }

    #[test]
    fn test_application_payload_tolerates_missing_id() {
        let app: ApplicationResponse =
            serde_json::from_value(json!({ "name": "sample", "source": "/src/tye.yaml" })).unwrap();
        assert_eq!(app.id, None);
        assert_eq!(app.name.as_deref(), Some("sample"));
    }
}
