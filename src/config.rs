use anyhow::{bail, Context, Result};
use std::time::Duration;

use crate::util::{is_local_endpoint_url, non_empty_env};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const API_URL_ENV: &str = "SRE_CONSOLE_API_URL";
pub const CLOUD_ID_ENV: &str = "ELASTIC_CLOUD_ID";
pub const API_KEY_ENV: &str = "ELASTIC_API_KEY";
pub const STREAM_TIMEOUT_ENV: &str = "SRE_CONSOLE_STREAM_TIMEOUT_SECS";

/// Per-request cluster credential overrides forwarded to the backend.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub cloud_id: Option<String>,
    pub api_key: Option<String>,
}

impl Credentials {
    pub const CLOUD_ID_HEADER: &'static str = "x-elastic-cloud-id";
    pub const API_KEY_HEADER: &'static str = "x-elastic-api-key";

    pub fn from_env() -> Self {
        Self {
            cloud_id: non_empty_env(CLOUD_ID_ENV),
            api_key: non_empty_env(API_KEY_ENV),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cloud_id.is_none() && self.api_key.is_none()
    }

    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::with_capacity(2);
        if let Some(cloud_id) = &self.cloud_id {
            headers.push((Self::CLOUD_ID_HEADER, cloud_id.clone()));
        }
        if let Some(api_key) = &self.api_key {
            headers.push((Self::API_KEY_HEADER, api_key.clone()));
        }
        headers
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("cloud_id", &self.cloud_id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub credentials: Credentials,
    /// Upper bound the caller races a streaming run against.
    pub stream_timeout: Option<Duration>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url = non_empty_env(API_URL_ENV).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let stream_timeout = match non_empty_env(STREAM_TIMEOUT_ENV) {
            Some(raw) => Some(Duration::from_secs(raw.parse::<u64>().with_context(|| {
                format!("{STREAM_TIMEOUT_ENV} must be a whole number of seconds, got '{raw}'")
            })?)),
            None => None,
        };

        Ok(Self {
            api_url,
            credentials: Credentials::from_env(),
            stream_timeout,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid {API_URL_ENV} '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if self.stream_timeout == Some(Duration::ZERO) {
            bail!("{STREAM_TIMEOUT_ENV} must be greater than zero");
        }

        if self.api_url.starts_with("http://")
            && !self.is_local_endpoint()
            && !self.credentials.is_empty()
        {
            tracing::warn!(
                url = %self.api_url,
                "credential overrides will be sent over plain http"
            );
        }

        Ok(())
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }
}
