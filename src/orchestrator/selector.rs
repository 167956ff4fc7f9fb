//! Content rotation: least used first, then oldest first

use std::sync::Arc;

use crate::models::ContentItem;
use crate::storage::{ContentRepository, StoreResult};

#[derive(Clone)]
pub struct ContentSelector {
    content: Arc<dyn ContentRepository>,
}

impl ContentSelector {
    pub fn new(content: Arc<dyn ContentRepository>) -> Self {
        Self { content }
    }

    /// Next item for `tenant_id`, or `None` when the inventory is empty
    pub async fn next(&self, tenant_id: &str) -> StoreResult<Option<ContentItem>> {
        let mut candidates = self.content.list_content_for_tenant(tenant_id, 1).await?;
        Ok(candidates.pop())
    }
}
