//! Graph API photo publishing
//!
//! `POST {graph_url}/{page_id}/photos` as multipart with `source` (image),
//! `message` (caption) and `access_token`. A successful response carries
//! `post_id` (or `id` for unpublished photos); failures carry an `error`
//! object with `message` and `code`.
//!
//! Creating a post is not idempotent, so the POST is only sent again when the
//! platform provably did nothing: see [`PublishError::is_safe_to_resend`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::error::{is_retryable_status, PublishError};
use super::{within, PostingClient, PublishReceipt, PublishRequest};
use crate::config::PublisherConfig;
use crate::utils::retry::{with_retry_if, RetryConfig};

#[derive(Debug, Deserialize)]
struct GraphResponse {
    id: Option<String>,
    post_id: Option<String>,
    error: Option<GraphError>,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: Option<String>,
    code: Option<i64>,
}

/// Graph API client for page photo posts
pub struct GraphApiClient {
    client: Client,
    graph_url: String,
    request_timeout: Duration,
    retry: RetryConfig,
}

impl GraphApiClient {
    /// Create a client from publisher configuration
    pub fn new(config: &PublisherConfig) -> Result<Self, PublishError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PublishError::Http(e.to_string()))?;

        Ok(Self {
            client,
            graph_url: config.graph_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout(),
            retry: config.retry_config(),
        })
    }

    /// Override the backoff policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn photos_url(&self, page_id: &str) -> String {
        format!("{}/{}/photos", self.graph_url, page_id)
    }

    async fn post_once(&self, request: &PublishRequest) -> Result<PublishReceipt, PublishError> {
        let source = Part::stream(request.payload.clone())
            .file_name("image.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| PublishError::Http(e.to_string()))?;

        let form = Form::new()
            .part("source", source)
            .text("message", request.caption.clone())
            .text("access_token", request.credential.clone());

        let response = self
            .client
            .post(self.photos_url(&request.page_id))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PublishError::Timeout {
                        timeout_ms: self.request_timeout.as_millis() as u64,
                    }
                } else if e.is_connect() {
                    PublishError::Connect(e.to_string())
                } else {
                    PublishError::Http(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PublishError::Http(e.to_string()))?;

        parse_response(status, &body)
    }
}

/// Interpret a Graph API response body
fn parse_response(status: u16, body: &str) -> Result<PublishReceipt, PublishError> {
    let parsed: GraphResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) if is_retryable_status(status) => {
            return Err(PublishError::Api {
                code: 0,
                status,
                message: crate::utils::truncate_text(body, 200),
            });
        }
        Err(_) => {
            return Err(PublishError::InvalidResponse(format!(
                "HTTP {status}: {}",
                crate::utils::truncate_text(body, 200)
            )));
        }
    };

    if let Some(error) = parsed.error {
        return Err(PublishError::Api {
            code: error.code.unwrap_or_default(),
            status,
            message: error.message.unwrap_or_else(|| "Unknown error".to_string()),
        });
    }

    if !(200..300).contains(&status) {
        return Err(PublishError::Api {
            code: 0,
            status,
            message: format!("HTTP {status}"),
        });
    }

    parsed
        .post_id
        .or(parsed.id)
        .filter(|id| !id.is_empty())
        .map(|external_post_id| PublishReceipt { external_post_id })
        .ok_or_else(|| PublishError::InvalidResponse("response carries no post id".to_string()))
}

#[async_trait]
impl PostingClient for GraphApiClient {
    async fn publish(
        &self,
        request: PublishRequest,
        timeout: Duration,
    ) -> Result<PublishReceipt, PublishError> {
        debug!(
            page_id = %request.page_id,
            bytes = request.payload.len(),
            "Publishing photo"
        );

        let receipt = within(
            timeout,
            with_retry_if(
                &self.retry,
                || self.post_once(&request),
                PublishError::is_safe_to_resend,
            ),
        )
        .await?;

        debug!(post_id = %receipt.external_post_id, "Photo published");
        Ok(receipt)
    }
}
