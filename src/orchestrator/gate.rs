//! Idempotency gate: at most one execution per slot key

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::{SlotExecutionRecord, SlotStatus};
use crate::storage::{SlotRecordRepository, StoreResult};

/// Claims slot keys through the store's atomic create-if-absent
#[derive(Clone)]
pub struct IdempotencyGate {
    slots: Arc<dyn SlotRecordRepository>,
}

impl IdempotencyGate {
    pub fn new(slots: Arc<dyn SlotRecordRepository>) -> Self {
        Self { slots }
    }

    /// Create the `running` record for `slot_key`.
    ///
    /// `false` means another invocation already owns the slot and the caller
    /// must not produce any side effect.
    pub async fn claim(
        &self,
        slot_key: &str,
        tenant_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let record = SlotExecutionRecord::running(slot_key, tenant_id, at);
        self.slots.create_slot_record(&record).await
    }

    pub async fn complete(&self, slot_key: &str, summary: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        self.finish(slot_key, SlotStatus::Completed, summary, at).await
    }

    pub async fn fail(&self, slot_key: &str, summary: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        self.finish(slot_key, SlotStatus::Failed, summary, at).await
    }

    async fn finish(
        &self,
        slot_key: &str,
        status: SlotStatus,
        summary: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let changed = self
            .slots
            .finish_slot_record(slot_key, status, summary, at)
            .await?;
        if !changed {
            // Already terminal (e.g. failed by the stale sweep)
            tracing::warn!(slot_key, status = %status, "Slot record was not running; transition ignored");
        }
        Ok(changed)
    }
}
