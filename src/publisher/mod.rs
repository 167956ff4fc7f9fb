//! Publishing collaborators
//!
//! The orchestrator sees two black boxes: a [`PayloadFetcher`] that turns a
//! content item's `payload_ref` into bytes, and a [`PostingClient`] that
//! publishes those bytes with a caption for one page. Both take a caller
//! supplied time budget and must return within it; internal retries happen
//! inside that budget.
//!
//! Implementations:
//! - [`GraphApiClient`] - multipart photo upload to the Graph API
//! - [`HttpPayloadFetcher`] - HTTP(S) download, bare file ids resolved against a base URL, `file://` for local files

pub mod error;
pub mod fetcher;
pub mod graph;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use error::PublishError;
pub use fetcher::HttpPayloadFetcher;
pub use graph::GraphApiClient;

/// One publish call
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Page id on the publishing platform
    pub page_id: String,

    /// Page access token
    pub credential: String,

    /// Image bytes
    pub payload: Bytes,

    pub caption: String,
}

/// Successful publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    /// Id assigned by the platform
    pub external_post_id: String,
}

/// Publishes content for a tenant
#[async_trait]
pub trait PostingClient: Send + Sync {
    /// Publish within `timeout`; transient failures may be retried internally
    async fn publish(
        &self,
        request: PublishRequest,
        timeout: Duration,
    ) -> Result<PublishReceipt, PublishError>;
}

/// Resolves a content payload reference to bytes
#[async_trait]
pub trait PayloadFetcher: Send + Sync {
    async fn fetch(&self, payload_ref: &str, timeout: Duration) -> Result<Bytes, PublishError>;
}

/// Run `fut` within `timeout`, mapping expiry to [`PublishError::Timeout`]
pub(crate) async fn within<T, F>(timeout: Duration, fut: F) -> Result<T, PublishError>
where
    F: std::future::Future<Output = Result<T, PublishError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(PublishError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
