//! REST/JSON transport backed by `reqwest`.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use wop_types::{config_error, optimization_error, History, OptimizationConfig, WopResult};

use crate::transport::{
    CreatedResponse, Envelope, HistoryUpload, ReadResponse, RemoteId, RemoteOutputs, Transport,
};

/// Server used when no URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://selene.onecert.fr/whatsopt";

const API_PREFIX: &str = "/api/v1";

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Server root, e.g. "http://localhost:3000".
    pub base_url: String,
    /// Sent as `Authorization: Token token=<key>` when present.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Route requests through the proxies named by `HTTP_PROXY` and friends.
    pub use_system_proxy: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
            use_system_proxy: true,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_system_proxy(mut self, enabled: bool) -> Self {
        self.use_system_proxy = enabled;
        self
    }

    /// Read `WOP_URL`, `WOP_API_KEY`, `WOP_TIMEOUT_SECS` and `WOP_NO_PROXY`,
    /// falling back to the defaults for unset variables.
    pub fn from_env() -> WopResult<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with variables looked up through
    /// `var`. Any value of `WOP_NO_PROXY` disables the system proxies.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> WopResult<Self> {
        let mut config = Self::default();
        if let Some(url) = var("WOP_URL") {
            config.base_url = url;
        }
        if let Some(key) = var("WOP_API_KEY") {
            config.api_key = Some(key);
        }
        if let Some(secs) = var("WOP_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                config_error!("WOP_TIMEOUT_SECS must be a whole number, got {secs:?}")
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if var("WOP_NO_PROXY").is_some() {
            config.use_system_proxy = false;
        }
        Ok(config)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{API_PREFIX}{path}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Talks to the optimization service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    config: ClientConfig,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> WopResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| optimization_error!("Failed to build HTTP client: {e}"))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn send(&self, request: RequestBuilder) -> WopResult<Response> {
        let request = match &self.config.api_key {
            Some(key) => request.header(AUTHORIZATION, format!("Token token={key}")),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            debug!("HTTP request failed: {}", e);
            optimization_error!("Connection failed")
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(optimization_error!("{}", error_message(status, &body)))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> WopResult<T> {
        response
            .json()
            .await
            .map_err(|e| optimization_error!("Malformed server response: {e}"))
    }
}

/// Server-supplied message if the body carries one, the status otherwise.
fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP error: {status}"))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn create(&self, config: &OptimizationConfig) -> WopResult<RemoteId> {
        let url = self.config.endpoint("/optimizations");
        debug!("POST {}", url);
        let response = self
            .send(self.client.post(&url).json(&Envelope {
                optimization: config,
            }))
            .await?;
        let created: CreatedResponse = Self::decode(response).await?;
        Ok(created.id)
    }

    async fn update(&self, id: &RemoteId, history: &History, with_best: bool) -> WopResult<()> {
        let url = self.config.endpoint(&format!("/optimizations/{id}"));
        debug!("PUT {} ({} points, with_best={})", url, history.len(), with_best);
        self.send(self.client.put(&url).json(&Envelope {
            optimization: HistoryUpload { history, with_best },
        }))
        .await?;
        Ok(())
    }

    async fn read(&self, id: &RemoteId) -> WopResult<RemoteOutputs> {
        let url = self.config.endpoint(&format!("/optimizations/{id}"));
        let response = self.send(self.client.get(&url)).await?;
        let read: ReadResponse = Self::decode(response).await?;
        Ok(read.outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;
    use wop_types::{Status, WopError};

    /// Answer a single request with a canned response and hand back the raw
    /// request text.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });

        (format!("http://{addr}"), handle)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buffer = [0u8; 1024];
        loop {
            let n = socket.read(&mut buffer).await.unwrap();
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buffer[..n]);

            if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&data[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).into_owned()
    }

    fn local(url: impl Into<String>) -> ClientConfig {
        ClientConfig::new(url).with_system_proxy(false)
    }

    fn body_of(request: &str) -> serde_json::Value {
        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_endpoint_building() {
        let config = ClientConfig::new("http://localhost:3000/");
        assert_eq!(
            config.endpoint("/optimizations/7"),
            "http://localhost:3000/api/v1/optimizations/7"
        );
    }

    #[test]
    fn test_error_message_prefers_server_text() {
        assert_eq!(
            error_message(StatusCode::BAD_REQUEST, r#"{"message": "xlimits invalid"}"#),
            "xlimits invalid"
        );
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>"),
            "HTTP error: 500 Internal Server Error"
        );
    }

    #[tokio::test]
    async fn test_create_posts_config() {
        let (url, server) = serve_once("201 Created", r#"{"id": 12}"#).await;
        let transport = HttpTransport::new(local(url).with_api_key("secret")).unwrap();
        let config = OptimizationConfig::with_bounds(vec![[0.0, 1.0]]).unwrap();

        let id = transport.create(&config).await.unwrap();
        assert_eq!(id, RemoteId::new("12"));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/v1/optimizations HTTP/1.1"));
        assert!(request.contains("Token token=secret"));
        let body = body_of(&request);
        assert_eq!(body["optimization"]["kind"], "SEGOMOE");
        assert_eq!(body["optimization"]["xlimits"], serde_json::json!([[0.0, 1.0]]));
    }

    #[tokio::test]
    async fn test_update_puts_history() {
        let (url, server) = serve_once("200 OK", "{}").await;
        let transport = HttpTransport::new(local(url)).unwrap();
        let history = History::from_doe(vec![vec![0.0]], vec![vec![4.0]]).unwrap();

        transport
            .update(&RemoteId::new("12"), &history, true)
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("PUT /api/v1/optimizations/12 HTTP/1.1"));
        assert_eq!(
            body_of(&request),
            serde_json::json!({"optimization": {"x": [[0.0]], "y": [[4.0]], "with_best": true}})
        );
    }

    #[tokio::test]
    async fn test_read_returns_outputs() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"outputs": {"x_suggested": [0.5], "status": 0}}"#,
        )
        .await;
        let transport = HttpTransport::new(local(url)).unwrap();

        let outputs = transport.read(&RemoteId::new("12")).await.unwrap();
        assert_eq!(outputs.x_suggested, Some(vec![0.5]));
        assert_eq!(outputs.status, Status::ValidPoint);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/v1/optimizations/12 HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_bad_request_surfaces_server_message() {
        let (url, _server) =
            serve_once("400 Bad Request", r#"{"message": "bad xtypes"}"#).await;
        let transport = HttpTransport::new(local(url)).unwrap();
        let config = OptimizationConfig::with_bounds(vec![[0.0, 1.0]]).unwrap();

        match transport.create(&config).await {
            Err(WopError::Optimization(message)) => assert_eq!(message, "bad xtypes"),
            other => panic!("Expected Optimization error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let (url, _server) = serve_once("200 OK", r#"{"outputs": {"status": "done"}}"#).await;
        let transport = HttpTransport::new(local(url)).unwrap();

        match transport.read(&RemoteId::new("1")).await {
            Err(WopError::Optimization(message)) => {
                assert!(message.starts_with("Malformed server response"))
            }
            other => panic!("Expected Optimization error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(local(format!("http://{addr}"))).unwrap();
        match transport.read(&RemoteId::new("1")).await {
            Err(WopError::Optimization(message)) => assert_eq!(message, "Connection failed"),
            other => panic!("Expected Optimization error, got {other:?}"),
        }
    }

    #[test]
    fn test_client_config_from_vars() {
        let config = ClientConfig::from_vars(|_| None).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.use_system_proxy);

        let config = ClientConfig::from_vars(|name| match name {
            "WOP_URL" => Some("http://localhost:3000".to_string()),
            "WOP_API_KEY" => Some("secret".to_string()),
            "WOP_TIMEOUT_SECS" => Some("5".to_string()),
            "WOP_NO_PROXY" => Some(String::new()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert!(!config.use_system_proxy);
    }

    #[test]
    fn test_client_config_rejects_bad_timeout() {
        let result = ClientConfig::from_vars(|name| {
            (name == "WOP_TIMEOUT_SECS").then(|| "soon".to_string())
        });
        match result {
            Err(WopError::Config(message)) => assert!(message.contains("WOP_TIMEOUT_SECS")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }
}
