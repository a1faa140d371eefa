use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Url;
use serde_json::Value;
use std::net::IpAddr;
use std::time::Duration;

use crate::error::{DispatchError, ForwardError, Result};

/// Delivers one payload downstream.
///
/// The dispatcher is generic over this trait; [`HttpForwarder`] is the
/// production implementation.
#[async_trait]
pub trait Forwarder: Send + Sync + 'static {
    /// Deliver `payload` and return the downstream status code.
    async fn forward(&self, payload: &Value) -> std::result::Result<u16, ForwardError>;
}

/// How the response status maps onto task success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusPolicy {
    /// Only 2xx counts as delivered
    #[default]
    RequireSuccess,
    /// Any status line counts as delivered
    AcceptAny,
}

#[derive(Clone)]
pub struct HttpForwarderConfig {
    /// Endpoint every payload is POSTed to
    pub url: Url,
    /// Sent as `Authorization: Bearer <api_key>` when set
    pub api_key: Option<String>,
    /// Upper bound for connect + send + response headers
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub status_policy: StatusPolicy,
}

impl HttpForwarderConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            api_key: None,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            status_policy: StatusPolicy::default(),
        }
    }
}

impl std::fmt::Debug for HttpForwarderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpForwarderConfig")
            .field("url", &self.url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("status_policy", &self.status_policy)
            .finish()
    }
}

/// POSTs payloads as JSON through one pooled reqwest client.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
    config: HttpForwarderConfig,
}

impl HttpForwarder {
    pub fn new(config: HttpForwarderConfig) -> Result<Self> {
        if !matches!(config.url.scheme(), "http" | "https") {
            return Err(DispatchError::InvalidConfig(format!(
                "forward URL must be http or https, got {}",
                config.url
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
                DispatchError::InvalidConfig("API key is not a valid header value".to_string())
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout);
        // Loopback endpoints never go through a system proxy.
        if is_loopback(&config.url) {
            builder = builder.no_proxy();
        }
        let client = builder.build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpForwarderConfig {
        &self.config
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback()),
        None => false,
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, payload: &Value) -> std::result::Result<u16, ForwardError> {
        // `send` resolves once the status line and headers are in; the body
        // is never read.
        let response = self
            .client
            .post(self.config.url.clone())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("Downstream {} responded {}", self.config.url, status);

        match self.config.status_policy {
            StatusPolicy::RequireSuccess if !status.is_success() => {
                Err(ForwardError::Status(status.as_u16()))
            }
            _ => Ok(status.as_u16()),
        }
    }
}
