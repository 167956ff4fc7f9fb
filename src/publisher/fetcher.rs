//! Payload download
//!
//! A `payload_ref` is resolved as:
//! - `http://` / `https://` URL: fetched as-is
//! - `file://` URL: read from the local filesystem
//! - anything without a scheme: treated as a file id and appended to the
//!   configured base URL (Drive-style `uc?export=download&id=`)

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::error::PublishError;
use super::{within, PayloadFetcher};
use crate::config::PublisherConfig;
use crate::utils::retry::{with_retry_if, RetryConfig};

/// Where a payload reference points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    Remote(Url),
    Local(std::path::PathBuf),
}

/// HTTP(S) and local-file payload fetcher
pub struct HttpPayloadFetcher {
    client: Client,
    base_url: String,
    retry: RetryConfig,
}

impl HttpPayloadFetcher {
    pub fn new(config: &PublisherConfig) -> Result<Self, PublishError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PublishError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.payload_base_url.clone(),
            retry: config.retry_config(),
        })
    }

    /// Override the backoff policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Resolve a payload reference without fetching it
    pub fn resolve(&self, payload_ref: &str) -> Result<PayloadSource, PublishError> {
        let trimmed = payload_ref.trim();
        if trimmed.is_empty() {
            return Err(PublishError::InvalidPayloadRef(payload_ref.to_string()));
        }

        if trimmed.contains("://") {
            let url = Url::parse(trimmed)
                .map_err(|_| PublishError::InvalidPayloadRef(payload_ref.to_string()))?;
            return match url.scheme() {
                "http" | "https" => Ok(PayloadSource::Remote(url)),
                "file" => url
                    .to_file_path()
                    .map(PayloadSource::Local)
                    .map_err(|_| PublishError::InvalidPayloadRef(payload_ref.to_string())),
                _ => Err(PublishError::InvalidPayloadRef(payload_ref.to_string())),
            };
        }

        let joined = format!("{}{}", self.base_url, urlencode(trimmed));
        Url::parse(&joined)
            .map(PayloadSource::Remote)
            .map_err(|_| PublishError::InvalidPayloadRef(payload_ref.to_string()))
    }

    async fn get_once(&self, url: &Url, payload_ref: &str) -> Result<Bytes, PublishError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| PublishError::download(payload_ref, e.to_string(), None))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::download(
                payload_ref,
                format!("HTTP {}", status.as_u16()),
                Some(status.as_u16()),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| PublishError::download(payload_ref, e.to_string(), None))?;

        if body.is_empty() {
            return Err(PublishError::download(payload_ref, "empty body", Some(status.as_u16())));
        }

        Ok(body)
    }
}

/// Percent-encode a file id for use in a query string
fn urlencode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[async_trait]
impl PayloadFetcher for HttpPayloadFetcher {
    async fn fetch(&self, payload_ref: &str, timeout: Duration) -> Result<Bytes, PublishError> {
        let source = self.resolve(payload_ref)?;

        let result = match &source {
            PayloadSource::Local(path) => {
                within(timeout, async {
                    tokio::fs::read(path)
                        .await
                        .map(Bytes::from)
                        .map_err(|e| PublishError::download(payload_ref, e.to_string(), None))
                })
                .await
            }
            PayloadSource::Remote(url) => {
                within(
                    timeout,
                    with_retry_if(
                        &self.retry,
                        || self.get_once(url, payload_ref),
                        PublishError::is_recoverable,
                    ),
                )
                .await
            }
        };

        // A download that runs out of time is still a download failure
        let bytes = result.map_err(|e| match e {
            PublishError::Timeout { .. } => {
                PublishError::download(payload_ref, e.to_string(), None)
            }
            other => other,
        })?;

        debug!(payload_ref, size = %crate::utils::format_bytes(bytes.len() as u64), "Payload downloaded");
        Ok(bytes)
    }
}
