//! Duplicate and overlapping triggers for the same slot

use std::sync::Arc;

use futures::future::join_all;

use slotcast::config::Config;
use slotcast::models::{LockRecord, SkipReason, SlotStatus};
use slotcast::orchestrator::TriggerResult;
use slotcast::storage::{LockRepository, OutcomeRepository, SlotRecordRepository, Storage};

use crate::common::{local, seed_content, seed_tenants, Harness};

async fn fire(h: &Harness, n: usize) -> Vec<TriggerResult> {
    let handles = (0..n).map(|_| {
        let orchestrator = Arc::clone(&h.orchestrator);
        tokio::spawn(async move { orchestrator.trigger().await })
    });

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("trigger task panicked"))
        .collect()
}

async fn assert_single_winner(h: &Harness) {
    let results = fire(h, 20).await;

    let winners: Vec<_> = results.iter().filter(|r| r.executed).collect();
    assert_eq!(winners.len(), 1, "{results:#?}");
    assert!(winners[0].success);

    let skipped = results
        .iter()
        .filter(|r| r.reason == Some(SkipReason::AlreadyExecuted))
        .count();
    assert_eq!(skipped, 19);

    assert_eq!(h.publisher.calls(), 1);
    let outcomes = h.storage.outcomes.outcomes_for_slot("20240115-05-00").await.unwrap();
    assert_eq!(outcomes.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_triggers_memory() {
    let h = Harness::seeded(2).await;
    assert_single_winner(&h).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_triggers_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Storage::sqlite(dir.path().join("slotcast.db")).unwrap();
    let config = Config::default();
    seed_tenants(&storage, &config.roster.tenants).await;
    seed_content(&storage, "FP_1", 2).await;

    let h = Harness::new(storage, config).await;
    assert_single_winner(&h).await;
}

#[tokio::test]
async fn test_retry_later_in_same_slot_is_noop() {
    let h = Harness::seeded(2).await;

    let first = h.orchestrator.trigger_at(local(2024, 1, 15, 5, 0)).await;
    assert!(first.success);

    let retried = h.orchestrator.trigger_at(local(2024, 1, 15, 5, 5)).await;
    assert_eq!(retried.slot_key.as_deref(), Some("20240115-05-00"));
    assert_eq!(retried.reason, Some(SkipReason::AlreadyExecuted));

    let next = h.orchestrator.trigger_at(local(2024, 1, 15, 5, 6)).await;
    assert!(next.success);
    assert_eq!(next.slot_key.as_deref(), Some("20240115-05-06"));
    assert_eq!(next.tenant_id.as_deref(), Some("FP_2"));

    assert_eq!(h.publisher.calls(), 2);
}

#[tokio::test]
async fn test_held_tenant_lock_blocks_and_closes_slot() {
    let h = Harness::seeded(1).await;
    let now = local(2024, 1, 15, 5, 0);

    // Another caller already holds FP_1 for this cycle
    let held = LockRecord {
        lock_id: "FP_1:20240115-c00".to_string(),
        tenant_id: "FP_1".to_string(),
        holder: "other-invocation".to_string(),
        created_at: now,
        expires_at: now + chrono::Duration::minutes(60),
    };
    assert!(h.storage.locks.try_acquire_lock(&held, now).await.unwrap());

    let result = h.orchestrator.trigger().await;
    assert!(!result.executed);
    assert_eq!(result.reason, Some(SkipReason::Locked));
    assert_eq!(h.publisher.calls(), 0);

    let record = h
        .storage
        .slots
        .get_slot_record("20240115-05-00")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, SlotStatus::Completed);
    assert_eq!(record.result_summary.as_deref(), Some("skipped:locked"));

    let lock = h.storage.locks.get_lock("FP_1:20240115-c00").await.unwrap().unwrap();
    assert_eq!(lock.holder, "other-invocation");
}
