//! Deadline handling, staleness sweep and internal failures

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use slotcast::config::Config;
use slotcast::models::{ContentItem, ErrorKind, SkipReason, SlotStatus};
use slotcast::orchestrator::Stage;
use slotcast::storage::{
    ContentRepository, LockRepository, SlotRecordRepository, Storage, StoreError, StoreResult,
};

use crate::common::{seed_content, seed_tenants, FakePublisher, Harness};

fn short_deadline() -> Config {
    let mut config = Config::default();
    config.orchestrator.invocation_deadline_secs = 1;
    config
}

async fn slow_harness() -> Harness {
    let config = short_deadline();
    let storage = Storage::memory();
    seed_tenants(&storage, &config.roster.tenants).await;
    seed_content(&storage, "FP_1", 1).await;
    Harness::with_publisher(storage, config, FakePublisher::with_delay(StdDuration::from_secs(3)))
        .await
}

#[tokio::test]
async fn test_deadline_leaves_record_running() {
    let h = slow_harness().await;

    let result = h.orchestrator.trigger().await;
    assert!(result.executed);
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Timeout));
    assert_eq!(result.stage, Stage::ContentSelected);
    assert_eq!(result.slot_key.as_deref(), Some("20240115-05-00"));
    assert_eq!(result.content_id.as_deref(), Some("FP_1-c0"));

    let record = h
        .storage
        .slots
        .get_slot_record("20240115-05-00")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, SlotStatus::Running);

    // Outcome unknown: never published twice
    let again = h.orchestrator.trigger().await;
    assert_eq!(again.reason, Some(SkipReason::AlreadyExecuted));
    assert_eq!(h.publisher.calls(), 1);
}

#[tokio::test]
async fn test_sweep_fails_stale_records_then_prunes_locks() {
    let h = slow_harness().await;
    h.orchestrator.trigger().await;

    // Not yet stale
    h.clock.advance(Duration::minutes(10));
    let early = h.orchestrator.sweep().await.unwrap();
    assert!(early.stale_slot_keys.is_empty());
    assert_eq!(early.locks_pruned, 0);

    h.clock.advance(Duration::minutes(21));
    let report = h.orchestrator.sweep().await.unwrap();
    assert_eq!(report.stale_slot_keys, vec!["20240115-05-00".to_string()]);
    assert_eq!(report.locks_pruned, 0);

    let record = h
        .storage
        .slots
        .get_slot_record("20240115-05-00")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, SlotStatus::Failed);
    assert_eq!(record.result_summary.as_deref(), Some("stale: abandoned"));

    // The cycle lock lives until 06:00
    h.clock.advance(Duration::minutes(30));
    let later = h.orchestrator.sweep().await.unwrap();
    assert!(later.stale_slot_keys.is_empty());
    assert_eq!(later.locks_pruned, 1);
    assert!(h
        .storage
        .locks
        .get_lock("FP_1:20240115-c00")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_sweep_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::sqlite(dir.path().join("slotcast.db")).unwrap();
    let config = short_deadline();
    seed_tenants(&storage, &config.roster.tenants).await;
    seed_content(&storage, "FP_1", 1).await;
    let h = Harness::with_publisher(
        storage,
        config,
        FakePublisher::with_delay(StdDuration::from_secs(3)),
    )
    .await;

    let result = h.orchestrator.trigger().await;
    assert_eq!(result.error_kind, Some(ErrorKind::Timeout));

    h.clock.advance(Duration::minutes(61));
    let report = h.orchestrator.sweep().await.unwrap();
    assert_eq!(report.stale_slot_keys.len(), 1);
    assert_eq!(report.locks_pruned, 1);

    let recent = h.storage.slots.recent_slot_records(5).await.unwrap();
    assert_eq!(recent[0].status, SlotStatus::Failed);
}

/// Content store whose every call fails
struct BrokenContent;

#[async_trait]
impl ContentRepository for BrokenContent {
    async fn insert_content(&self, _item: &ContentItem) -> StoreResult<()> {
        Err(StoreError::Poisoned)
    }

    async fn get_content(&self, _id: &str) -> StoreResult<Option<ContentItem>> {
        Err(StoreError::Poisoned)
    }

    async fn list_content_for_tenant(
        &self,
        _tenant_id: &str,
        _limit: usize,
    ) -> StoreResult<Vec<ContentItem>> {
        Err(StoreError::Poisoned)
    }

    async fn increment_usage(
        &self,
        _content_id: &str,
        _usage_key: &str,
        _at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        Err(StoreError::Poisoned)
    }

    async fn count_unused_content(&self, _tenant_id: &str) -> StoreResult<u64> {
        Err(StoreError::Poisoned)
    }
}

#[tokio::test]
async fn test_store_failure_after_claim_is_err_unknown() {
    let config = Config::default();
    let mut storage = Storage::memory();
    seed_tenants(&storage, &config.roster.tenants).await;
    storage.content = Arc::new(BrokenContent);
    let h = Harness::new(storage, config).await;

    let result = h.orchestrator.trigger().await;
    assert!(result.executed);
    assert_eq!(result.error_kind, Some(ErrorKind::Unknown));
    assert_eq!(result.stage, Stage::LockAcquired);
    assert_eq!(h.publisher.calls(), 0);

    let record = h
        .storage
        .slots
        .get_slot_record("20240115-05-00")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, SlotStatus::Failed);
    assert!(record.result_summary.unwrap().starts_with("ERR_UNKNOWN: "));
}
