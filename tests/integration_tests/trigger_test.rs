//! Trigger flow from kill switch to recorded outcome

use slotcast::clock::Clock;
use slotcast::config::Config;
use slotcast::models::{ErrorKind, SkipReason, SlotStatus};
use slotcast::orchestrator::Stage;
use slotcast::storage::{ContentRepository, OutcomeRepository, SlotRecordRepository, Storage};

use crate::common::{local, seed_content, seed_tenants, Harness};

async fn stocked(storage: Storage) -> Harness {
    let config = Config::default();
    seed_tenants(&storage, &config.roster.tenants).await;
    for tenant in &config.roster.tenants {
        seed_content(&storage, tenant, 3).await;
    }
    Harness::new(storage, config).await
}

async fn assert_happy_path(h: &Harness) {
    let result = h.orchestrator.trigger().await;

    assert!(result.executed, "{result:?}");
    assert!(result.success);
    assert_eq!(result.stage, Stage::Recorded);
    assert_eq!(result.slot_key.as_deref(), Some("20240115-05-00"));
    assert_eq!(result.tenant_id.as_deref(), Some("FP_1"));
    assert_eq!(result.content_id.as_deref(), Some("FP_1-c0"));
    assert_eq!(result.post_id.as_deref(), Some("page-FP_1_post_0"));
    assert!(result.reason.is_none());
    assert!(result.error_kind.is_none());

    let record = h
        .storage
        .slots
        .get_slot_record("20240115-05-00")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, SlotStatus::Completed);
    assert_eq!(record.result_summary.as_deref(), Some("success:page-FP_1_post_0"));
    assert!(record.completed_at.is_some());

    let item = h.storage.content.get_content("FP_1-c0").await.unwrap().unwrap();
    assert_eq!(item.used_count, 1);
    assert_eq!(item.last_used_at, Some(h.clock.now()));

    let outcomes = h.storage.outcomes.outcomes_for_slot("20240115-05-00").await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].success);
    assert_eq!(outcomes[0].content_id, "FP_1-c0");

    assert_eq!(
        h.publisher.published(),
        vec![("page-FP_1".to_string(), "caption FP_1-c0".to_string())]
    );
}

#[tokio::test]
async fn test_happy_path_memory() {
    let h = stocked(Storage::memory()).await;
    assert_happy_path(&h).await;
}

#[tokio::test]
async fn test_happy_path_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::sqlite(dir.path().join("slotcast.db")).unwrap();
    let h = stocked(storage).await;
    assert_happy_path(&h).await;
}

#[tokio::test]
async fn test_kill_switch_precedence() {
    let h = Harness::seeded(2).await;

    h.orchestrator
        .kill_switch()
        .set_enabled(false, h.clock.now())
        .await
        .unwrap();

    let result = h.orchestrator.trigger().await;
    assert!(!result.executed);
    assert_eq!(result.reason, Some(SkipReason::Disabled));
    assert_eq!(result.stage, Stage::Received);
    assert!(result.slot_key.is_none());
    assert_eq!(h.publisher.calls(), 0);
    assert!(h.storage.slots.recent_slot_records(10).await.unwrap().is_empty());

    // Turning it back on inside the same slot publishes normally
    h.orchestrator
        .kill_switch()
        .set_enabled(true, h.clock.now())
        .await
        .unwrap();
    let result = h.orchestrator.trigger().await;
    assert!(result.success);
    assert_eq!(h.publisher.calls(), 1);
}

#[tokio::test]
async fn test_window_boundaries() {
    let h = Harness::seeded(1).await;

    let before = h.orchestrator.trigger_at(local(2024, 1, 15, 4, 59)).await;
    assert_eq!(before.reason, Some(SkipReason::OutsideWindow));

    let first = h.orchestrator.trigger_at(local(2024, 1, 15, 5, 0)).await;
    assert!(first.success);
    assert_eq!(first.slot_key.as_deref(), Some("20240115-05-00"));

    let last = h.orchestrator.trigger_at(local(2024, 1, 15, 21, 59)).await;
    assert!(last.success, "{last:?}");
    assert_eq!(last.slot_key.as_deref(), Some("20240115-21-54"));
    assert_eq!(last.tenant_id.as_deref(), Some("FP_10"));

    let after = h.orchestrator.trigger_at(local(2024, 1, 15, 22, 0)).await;
    assert_eq!(after.reason, Some(SkipReason::OutsideWindow));

    assert_eq!(h.publisher.calls(), 2);
}

#[tokio::test]
async fn test_empty_inventory_skips_and_closes_slot() {
    let config = Config::default();
    let storage = Storage::memory();
    seed_tenants(&storage, &config.roster.tenants).await;
    let h = Harness::new(storage, config).await;

    let result = h.orchestrator.trigger().await;
    assert!(!result.executed);
    assert_eq!(result.reason, Some(SkipReason::NoContent));
    assert_eq!(result.stage, Stage::LockAcquired);

    let record = h
        .storage
        .slots
        .get_slot_record("20240115-05-00")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, SlotStatus::Completed);
    assert_eq!(record.result_summary.as_deref(), Some("skipped:no_content"));

    // Adding content later does not reopen the slot
    seed_content(&h.storage, "FP_1", 1).await;
    let again = h.orchestrator.trigger().await;
    assert_eq!(again.reason, Some(SkipReason::AlreadyExecuted));
    assert_eq!(h.publisher.calls(), 0);
}

#[tokio::test]
async fn test_missing_tenant_is_no_credentials() {
    let storage = Storage::memory();
    seed_content(&storage, "FP_1", 1).await;
    let h = Harness::new(storage, Config::default()).await;

    let result = h.orchestrator.trigger().await;
    assert_eq!(result.reason, Some(SkipReason::NoCredentials));
    assert!(!result.executed);
    assert_eq!(h.publisher.calls(), 0);

    let item = h.storage.content.get_content("FP_1-c0").await.unwrap().unwrap();
    assert_eq!(item.used_count, 0);
}

#[tokio::test]
async fn test_download_failure_is_err_download() {
    let h = Harness::seeded(2).await;
    h.fetcher.fail_ref("ref-FP_1-c0");

    let result = h.orchestrator.trigger().await;
    assert!(result.executed);
    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Download));
    assert!(result.error_message.as_deref().unwrap().contains("HTTP 404"));
    assert_eq!(h.publisher.calls(), 0);

    let record = h
        .storage
        .slots
        .get_slot_record("20240115-05-00")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, SlotStatus::Failed);
    assert!(record.result_summary.unwrap().starts_with("ERR_DOWNLOAD: "));

    let outcomes = h.storage.outcomes.recent_outcomes(10).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].error_kind, Some(ErrorKind::Download));

    let item = h.storage.content.get_content("FP_1-c0").await.unwrap().unwrap();
    assert_eq!(item.used_count, 0);
}

#[tokio::test]
async fn test_publish_failure_is_err_publish() {
    let h = Harness::seeded(1).await;
    h.publisher.fail_page("page-FP_1");

    let result = h.orchestrator.trigger().await;
    assert!(result.executed);
    assert_eq!(result.error_kind, Some(ErrorKind::Publish));
    assert_eq!(result.outcome_label(), "failed");
    assert_eq!(result.reason_label(), "ERR_PUBLISH");

    // Not retried inside the slot
    let again = h.orchestrator.trigger().await;
    assert_eq!(again.reason, Some(SkipReason::AlreadyExecuted));
    assert_eq!(h.publisher.calls(), 1);
}
