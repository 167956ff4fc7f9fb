//! Outcome recording
//!
//! Write order is fixed: audit entry first, then the usage bump, then the slot
//! record transition. A crash between steps leaves an outcome without a usage
//! mark, which an audit can spot. The usage bump is keyed by slot, so
//! replaying it never counts the same publish twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::gate::IdempotencyGate;
use crate::models::{ErrorKind, PostingOutcome};
use crate::storage::{ContentRepository, OutcomeRepository, StoreResult};
use crate::utils::truncate_text;

/// Result of one publish attempt, as handed to the recorder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    Published { external_post_id: String },
    Failed { kind: ErrorKind, message: String },
}

/// Maximum stored length of an error message
const MAX_ERROR_MESSAGE: usize = 1000;

#[derive(Clone)]
pub struct OutcomeRecorder {
    outcomes: Arc<dyn OutcomeRepository>,
    content: Arc<dyn ContentRepository>,
    gate: IdempotencyGate,
}

impl OutcomeRecorder {
    pub fn new(
        outcomes: Arc<dyn OutcomeRepository>,
        content: Arc<dyn ContentRepository>,
        gate: IdempotencyGate,
    ) -> Self {
        Self {
            outcomes,
            content,
            gate,
        }
    }

    /// Persist a publish attempt for `slot_key` and close its slot record
    pub async fn record(
        &self,
        slot_key: &str,
        tenant_id: &str,
        content_id: &str,
        result: &PublishResult,
        duration_ms: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<PostingOutcome> {
        match result {
            PublishResult::Published { external_post_id } => {
                let outcome = PostingOutcome::succeeded(
                    slot_key,
                    tenant_id,
                    content_id,
                    external_post_id.as_str(),
                    duration_ms,
                    at,
                );
                self.outcomes.append_outcome(&outcome).await?;

                let counted = self.content.increment_usage(content_id, slot_key, at).await?;
                if !counted {
                    tracing::warn!(slot_key, content_id, "Usage already counted for this slot");
                }

                self.gate
                    .complete(slot_key, &format!("success:{external_post_id}"), at)
                    .await?;
                Ok(outcome)
            }
            PublishResult::Failed { kind, message } => {
                let message = truncate_text(message, MAX_ERROR_MESSAGE);
                let outcome = PostingOutcome::failed(
                    slot_key,
                    tenant_id,
                    content_id,
                    *kind,
                    message.as_str(),
                    duration_ms,
                    at,
                );
                self.outcomes.append_outcome(&outcome).await?;

                // Usage is left untouched so the item stays first in line
                self.gate
                    .fail(slot_key, &format!("{kind}: {message}"), at)
                    .await?;
                Ok(outcome)
            }
        }
    }
}
