use crate::config::EngineConfig;
use crate::traits::PageSource;
use crate::types::{PageRequest, Result, TransportError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Pages served by the upstream JSON API over HTTP, authorized with a bearer token.
pub struct HttpPageSource {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpPageSource {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.fetch.user_agent)
            .timeout(Duration::from_secs(config.fetch.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            base_url: config.endpoint_base()?,
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint_for(&self, path: &str) -> std::result::Result<Url, TransportError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::Network(format!("invalid endpoint {}: {}", path, e)))
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    fn source_name(&self) -> String {
        format!("HTTP API ({})", self.base_url)
    }

    async fn fetch_page(&self, request: &PageRequest) -> std::result::Result<Value, TransportError> {
        let url = self.endpoint_for(&request.path)?;
        debug!("GET {} ({})", url, request.content_type);

        let mut builder = self.client.get(url).query(&request.query_pairs());
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let body = response.text().await.map_err(classify)?;
        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Ok(value),
            Err(e) => {
                // Not fatal: an unparseable body reads as an empty page upstream.
                warn!("Response for {} is not JSON: {}", request.content_type, e);
                Ok(Value::Null)
            }
        }
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}
