use crate::types::{ApplicationResponse, ServiceResponse};
use crate::{ops, DashboardConfig, Result, TyeError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Typed access to one dashboard's `/api/v1` control API.
///
/// Every call is cancellable through `cancel`; no call retries.
#[async_trait]
pub trait TyeClient: Send + Sync {
    fn dashboard(&self) -> &str;

    async fn get_application(&self, cancel: &CancellationToken) -> Result<ApplicationResponse>;

    async fn get_services(&self, cancel: &CancellationToken) -> Result<Vec<ServiceResponse>>;

    async fn get_endpoints(&self, cancel: &CancellationToken) -> Result<Vec<String>>;

    async fn get_log(&self, service_name: &str, cancel: &CancellationToken) -> Result<String>;

    async fn shut_down(&self, cancel: &CancellationToken) -> Result<()>;
}

/// Maps a dashboard URL to a client, or `None` when the transport is not supported.
pub type ClientProvider = Arc<dyn Fn(&str) -> Option<Arc<dyn TyeClient>> + Send + Sync>;

pub fn http_client_provider(config: DashboardConfig) -> ClientProvider {
    Arc::new(move |dashboard: &str| {
        match HttpTyeClient::new(dashboard, config.clone()) {
            Ok(client) => Some(Arc::new(client) as Arc<dyn TyeClient>),
            Err(e) => {
                tracing::debug!("No dashboard client for {}: {}", dashboard, e);
                None
            }
        }
    })
}

#[derive(Debug, Clone)]
pub struct HttpTyeClient {
    config: DashboardConfig,
    base: Url,
    dashboard: String,
    http_client: reqwest::Client,
}

impl HttpTyeClient {
    pub fn new(dashboard: &str, config: DashboardConfig) -> Result<Self> {
        let mut base =
            Url::parse(dashboard).map_err(|e| TyeError::InvalidUrl(format!("{dashboard}: {e}")))?;

        match base.scheme() {
            "http" | "https" => {}
            other => return Err(TyeError::UnsupportedScheme(other.to_string())),
        }

        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http_client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            config,
            base,
            dashboard: dashboard.to_string(),
            http_client,
        })
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn dashboard(&self) -> &str {
        &self.dashboard
    }

    /// Builds `<dashboard>/<segments...>`, percent-encoding each segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| TyeError::InvalidUrl(self.dashboard.clone()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        cancel: &CancellationToken,
    ) -> Result<T> {
        let url = self.endpoint(segments)?;

        tracing::trace!("GET {}", url);

        let body = self
            .cancellable(cancel, async {
                let response = self.http_client.get(url.clone()).send().await?;

                if !response.status().is_success() {
                    return Err(TyeError::http(response.status(), url.as_str()));
                }

                Ok(response.bytes().await?)
            })
            .await?;

        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn delete(&self, segments: &[&str], cancel: &CancellationToken) -> Result<()> {
        let url = self.endpoint(segments)?;

        tracing::trace!("DELETE {}", url);

        self.cancellable(cancel, async {
            let response = self.http_client.delete(url.clone()).send().await?;

            if !response.status().is_success() {
                return Err(TyeError::http(response.status(), url.as_str()));
            }

            Ok(())
        })
        .await
    }

    async fn cancellable<T>(
        &self,
        cancel: &CancellationToken,
        request: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            _ = cancel.cancelled() => Err(TyeError::Cancelled),
            result = request => result.map_err(|e| match e {
                TyeError::Connection(e) if e.is_timeout() => TyeError::Timeout(self.config.timeout),
                other => other,
            }),
        }
    }
}

#[async_trait]
impl TyeClient for HttpTyeClient {
    fn dashboard(&self) -> &str {
        &self.dashboard
    }

    async fn get_application(&self, cancel: &CancellationToken) -> Result<ApplicationResponse> {
        ops::application::get_application(self, cancel).await
    }

    async fn get_services(&self, cancel: &CancellationToken) -> Result<Vec<ServiceResponse>> {
        ops::services::get_services(self, cancel).await
    }

    async fn get_endpoints(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        ops::endpoints::get_endpoints(self, cancel).await
    }

    async fn get_log(&self, service_name: &str, cancel: &CancellationToken) -> Result<String> {
        ops::logs::get_log(self, service_name, cancel).await
    }

    async fn shut_down(&self, cancel: &CancellationToken) -> Result<()> {
        ops::shutdown::shut_down(self, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves canned responses keyed by request line; records every request line seen.
    async fn serve(routes: Vec<(&'static str, u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buffer = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buffer.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buffer.extend_from_slice(&chunk[..n]);
                }
                let head = String::from_utf8_lossy(&buffer).to_string();
                let request_line = head.lines().next().unwrap_or_default().to_string();
                recorded.lock().unwrap().push(request_line.clone());

                let (status, body) = routes
                    .iter()
                    .find(|(line, _, _)| request_line.starts_with(line))
                    .map(|(_, status, body)| (*status, *body))
                    .unwrap_or((404, ""));
                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}"), seen)
    }

    #[test]
    fn test_client_rejects_unsupported_scheme() {
        let err = HttpTyeClient::new("ftp://localhost:21", DashboardConfig::default()).unwrap_err();
        assert!(matches!(err, TyeError::UnsupportedScheme(ref s) if s == "ftp"));

        let err = HttpTyeClient::new("not a url", DashboardConfig::default()).unwrap_err();
        assert!(matches!(err, TyeError::InvalidUrl(_)));
    }

    #[test]
    fn test_provider_returns_none_for_other_schemes() {
        let provider = http_client_provider(DashboardConfig::default());
        assert!(provider("http://localhost:8000").is_some());
        assert!(provider("https://localhost:8443").is_some());
        assert!(provider("file:///tmp/dashboard").is_none());
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = HttpTyeClient::new("http://localhost:8000", DashboardConfig::default()).unwrap();
        assert_eq!(
            client.endpoint(&["api", "v1", "services"]).unwrap().as_str(),
            "http://localhost:8000/api/v1/services"
        );
        assert_eq!(
            client.endpoint(&["api", "v1", "logs", "my svc"]).unwrap().as_str(),
            "http://localhost:8000/api/v1/logs/my%20svc"
        );

        let nested = HttpTyeClient::new("http://localhost:8000/tye", DashboardConfig::default()).unwrap();
        assert_eq!(
            nested.endpoint(&["api", "v1"]).unwrap().as_str(),
            "http://localhost:8000/tye/api/v1"
        );
    }

    #[tokio::test]
    async fn test_get_application_and_services() {
        let (dashboard, seen) = serve(vec![
            ("GET /api/v1/application ", 200, r#"{"id":"1","name":"app","source":"tye.yaml"}"#),
            (
                "GET /api/v1/services ",
                200,
                r#"[{"description":{"name":"web"},"replicas":{"web_1":{"name":"web_1","pid":4242,"environment":{},"ports":[5000]}},"serviceType":"project","serviceSource":"Configuration"}]"#,
            ),
        ])
        .await;

        let client = HttpTyeClient::new(&dashboard, DashboardConfig::default()).unwrap();
        let cancel = CancellationToken::new();

        let application = TyeClient::get_application(&client, &cancel).await.unwrap();
        assert_eq!(application.id.as_deref(), Some("1"));
        assert_eq!(application.name.as_deref(), Some("app"));

        let services = TyeClient::get_services(&client, &cancel).await.unwrap();
        assert_eq!(services[0].replicas["web_1"].pid, Some(4242));

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn test_get_log_joins_lines_and_shutdown_uses_delete() {
        let (dashboard, seen) = serve(vec![
            ("GET /api/v1/logs/web ", 200, r#"["line one","line two"]"#),
            ("DELETE /api/v1/control ", 200, ""),
        ])
        .await;

        let client = HttpTyeClient::new(&dashboard, DashboardConfig::default()).unwrap();
        let cancel = CancellationToken::new();

        let log = TyeClient::get_log(&client, "web", &cancel).await.unwrap();
        assert_eq!(log, "line one\nline two");

        TyeClient::shut_down(&client, &cancel).await.unwrap();
        assert!(seen
            .lock()
            .unwrap()
            .iter()
            .any(|line| line.starts_with("DELETE /api/v1/control")));
    }

    #[tokio::test]
    async fn test_get_endpoints_rejects_non_array_and_http_errors() {
        let (dashboard, _) = serve(vec![("GET /api/v1 ", 200, r#"{"not":"an array"}"#)]).await;
        let client = HttpTyeClient::new(&dashboard, DashboardConfig::default()).unwrap();
        let cancel = CancellationToken::new();

        let err = TyeClient::get_endpoints(&client, &cancel).await.unwrap_err();
        assert!(matches!(err, TyeError::InvalidResponse(_)));

        let err = TyeClient::get_services(&client, &cancel).await.unwrap_err();
        assert!(matches!(err, TyeError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_non_json_body_is_deserialize_error() {
        let (dashboard, _) = serve(vec![("GET /api/v1 ", 200, "<html>ingress</html>")]).await;
        let client = HttpTyeClient::new(&dashboard, DashboardConfig::default()).unwrap();

        let err = TyeClient::get_endpoints(&client, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TyeError::Deserialize(_)));
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        // Accepts but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _held = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = HttpTyeClient::new(&format!("http://{addr}"), DashboardConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = TyeClient::get_endpoints(&client, &cancel).await.unwrap_err();
        assert!(matches!(err, TyeError::Cancelled));
    }
}
