//! Staleness sweep
//!
//! A slot record still `running` long after its invocation deadline belongs
//! to a crashed or cancelled invocation. Its outcome is unknown, so it is
//! closed as `failed` with a fixed summary and never re-executed. Expired
//! lock rows are deleted in the same pass.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::clock::SharedClock;
use crate::storage::{LockRepository, SlotRecordRepository, StoreResult};

/// Summary written on swept records
pub const STALE_SUMMARY: &str = "stale: abandoned";

/// What one sweep changed
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub swept_at: DateTime<Utc>,
    pub stale_slot_keys: Vec<String>,
    pub locks_pruned: usize,
}

#[derive(Clone)]
pub struct Reconciler {
    slots: Arc<dyn SlotRecordRepository>,
    locks: Arc<dyn LockRepository>,
    clock: SharedClock,
    stale_after: Duration,
}

impl Reconciler {
    pub fn new(
        slots: Arc<dyn SlotRecordRepository>,
        locks: Arc<dyn LockRepository>,
        clock: SharedClock,
        stale_after: Duration,
    ) -> Self {
        Self {
            slots,
            locks,
            clock,
            stale_after,
        }
    }

    pub async fn sweep(&self) -> StoreResult<SweepReport> {
        let now = self.clock.now();
        let cutoff = now - self.stale_after;

        let stale_slot_keys = self
            .slots
            .fail_stale_slot_records(cutoff, STALE_SUMMARY, now)
            .await?;
        let locks_pruned = self.locks.prune_expired_locks(now).await?;

        for slot_key in &stale_slot_keys {
            tracing::warn!(slot_key = %slot_key, "Stale running slot record failed");
        }
        tracing::info!(
            stale = stale_slot_keys.len(),
            locks_pruned,
            "Sweep complete"
        );
        crate::metrics::record_sweep(stale_slot_keys.len(), locks_pruned);

        Ok(SweepReport {
            swept_at: now,
            stale_slot_keys,
            locks_pruned,
        })
    }
}
