use super::logging::{debug_payload_enabled, emit_debug_payload, emit_stream_open};
use crate::config::{Config, Credentials, API_URL_ENV};
use crate::error::RunError;
use crate::types::{
    ActionsResponse, ChatRequest, ChatResponse, HealthResponse, IncidentStats, IncidentsResponse,
    SimCleanup, SimResponse, SimScenario,
};
use crate::util::is_local_endpoint_url;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Streaming endpoints a run can be opened against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTarget {
    Pipeline,
    Guardian { service: String },
}

impl StreamTarget {
    pub fn path_segments(&self) -> Vec<&str> {
        match self {
            StreamTarget::Pipeline => vec!["api", "pipeline", "run"],
            StreamTarget::Guardian { service } => {
                vec!["api", "guardian", "stream", service.as_str()]
            }
        }
    }
}

impl std::fmt::Display for StreamTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamTarget::Pipeline => f.write_str("pipeline"),
            StreamTarget::Guardian { service } => write!(f, "guardian:{service}"),
        }
    }
}

/// Anything that can open the byte stream of a run.
#[async_trait]
pub trait StreamSource: Send + Sync {
    async fn open_stream(&self, target: &StreamTarget) -> std::result::Result<ByteStream, RunError>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = Url::parse(config.api_url.trim())
            .with_context(|| format!("invalid {API_URL_ENV} '{}'", config.api_url))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!(
                "{API_URL_ENV} '{}' cannot be used as a base URL",
                config.api_url
            ));
        }

        let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
        // A proxy never fronts the local backend.
        if is_local_endpoint_url(base_url.as_str()) {
            builder = builder.no_proxy();
        }
        let http = builder.build().context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            credentials: config.credentials.clone(),
        })
    }

    /// Same client, different credential overrides.
    pub fn with_credentials(&self, credentials: Credentials) -> Self {
        Self {
            credentials,
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join path segments onto the base URL, escaping each segment.
    pub fn endpoint_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("base URL '{}' cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let mut request = self.http.request(method, url);
        for (name, value) in self.credentials.headers() {
            request = request.header(name, value);
        }
        request
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.endpoint_url(segments)?;
        let request_url = url.to_string();
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("unexpected response body from '{request_url}'"))
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        segments: &[&str],
        body: Option<&B>,
    ) -> Result<T> {
        let url = self.endpoint_url(segments)?;
        let request_url = url.to_string();
        let mut request = self.request(Method::POST, url);

        if let Some(body) = body {
            let payload = serde_json::to_value(body).context("failed to encode request body")?;
            if debug_payload_enabled() {
                emit_debug_payload(&request_url, &payload);
            }
            request = request.json(&payload);
        }

        let response = request
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("unexpected response body from '{request_url}'"))
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get_json(&["api", "health"]).await
    }

    pub async fn incidents(&self) -> Result<IncidentsResponse> {
        self.get_json(&["api", "incidents"]).await
    }

    pub async fn incident_stats(&self) -> Result<IncidentStats> {
        self.get_json(&["api", "incidents", "stats"]).await
    }

    pub async fn actions(&self) -> Result<ActionsResponse> {
        self.get_json(&["api", "actions"]).await
    }

    pub async fn guardian_status(&self) -> Result<Value> {
        self.get_json(&["api", "guardian", "status"]).await
    }

    pub async fn chat(&self, agent_id: &str, message: &str) -> Result<ChatResponse> {
        let body = ChatRequest {
            agent_id: agent_id.to_string(),
            message: message.to_string(),
        };
        self.post_json(&["api", "chat"], Some(&body)).await
    }

    pub async fn sim_status(&self) -> Result<Value> {
        self.get_json(&["api", "sim", "status"]).await
    }

    pub async fn sim_setup(&self) -> Result<SimResponse> {
        self.post_json::<_, Value>(&["api", "sim", "setup"], None).await
    }

    pub async fn sim_stream_start(&self) -> Result<SimResponse> {
        self.post_json::<_, Value>(&["api", "sim", "stream", "start"], None)
            .await
    }

    pub async fn sim_stream_stop(&self) -> Result<SimResponse> {
        self.post_json::<_, Value>(&["api", "sim", "stream", "stop"], None)
            .await
    }

    pub async fn sim_inject(&self, scenario: SimScenario) -> Result<SimResponse> {
        self.post_json::<_, Value>(&["api", "sim", "inject", scenario.as_path()], None)
            .await
    }

    pub async fn sim_cleanup(&self, cleanup: SimCleanup) -> Result<SimResponse> {
        self.post_json::<_, Value>(&["api", "sim", "cleanup", cleanup.as_path()], None)
            .await
    }
}

#[async_trait]
impl StreamSource for ApiClient {
    async fn open_stream(
        &self,
        target: &StreamTarget,
    ) -> std::result::Result<ByteStream, RunError> {
        let url = self
            .endpoint_url(&target.path_segments())
            .map_err(|error| RunError::Open(format!("{error:#}")))?;
        let request_url = url.to_string();

        let response = self
            .request(Method::POST, url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|error| {
                RunError::Open(format!("{:#}", map_api_request_error(error, &request_url)))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RunError::OpenStatus {
                url: request_url,
                status: status.as_u16(),
                body: truncate_body(body.trim()),
            });
        }
        if response.content_length() == Some(0) {
            return Err(RunError::MissingBody(request_url));
        }

        emit_stream_open(&request_url, status.as_u16());
        let request_url_for_stream = request_url.clone();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_api_request_error(error, &request_url_for_stream))
        });
        Ok(Box::pin(stream))
    }
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let mut truncated: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    truncated.push('…');
    truncated
}

/// Wrap a reqwest error with endpoint context; render with `{:#}` to keep
/// the underlying cause.
fn map_api_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    let context = if error.is_connect() && is_local_endpoint_url(request_url) {
        format!(
            "cannot reach local backend '{request_url}'. Start the backend or update {API_URL_ENV}"
        )
    } else if error.is_connect() {
        format!("cannot reach backend '{request_url}'")
    } else if error.is_timeout() {
        format!("request to '{request_url}' timed out")
    } else if let Some(status) = error.status() {
        format!("backend endpoint '{request_url}' returned HTTP {status}")
    } else {
        format!("request to '{request_url}' failed")
    };
    anyhow::Error::new(error).context(context)
}
