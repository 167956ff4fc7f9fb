//! Tenant rotation across a day and content fairness inside a tenant

use chrono::{Duration, TimeZone, Utc};

use slotcast::config::Config;
use slotcast::models::{ContentItem, ErrorKind};
use slotcast::storage::{ContentRepository, Storage};

use crate::common::{local, seed_tenants, Harness};

#[tokio::test]
async fn test_first_cycle_visits_every_tenant_in_order() {
    let h = Harness::seeded(2).await;

    for i in 0..10u32 {
        let at = local(2024, 1, 15, 5, i * 6);
        h.clock.set(at);

        let result = h.orchestrator.trigger().await;
        let expected_tenant = format!("FP_{}", i + 1);
        assert!(result.success, "{result:?}");
        assert_eq!(result.tenant_id.as_deref(), Some(expected_tenant.as_str()));
        assert_eq!(
            result.content_id.as_deref(),
            Some(format!("{expected_tenant}-c0").as_str())
        );
    }

    // Second cycle starts over at FP_1 with its next item
    h.clock.set(local(2024, 1, 15, 6, 0));
    let result = h.orchestrator.trigger().await;
    assert_eq!(result.slot_key.as_deref(), Some("20240115-06-00"));
    assert_eq!(result.tenant_id.as_deref(), Some("FP_1"));
    assert_eq!(result.content_id.as_deref(), Some("FP_1-c1"));

    assert_eq!(h.publisher.calls(), 11);
}

#[tokio::test]
async fn test_least_used_content_goes_first() {
    let config = Config::default();
    let storage = Storage::memory();
    seed_tenants(&storage, &config.roster.tenants).await;

    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for (i, used) in [2u32, 0, 1, 0].into_iter().enumerate() {
        let id = format!("FP_1-c{i}");
        let item = ContentItem::new("FP_1", format!("ref-{id}"), format!("caption {id}"))
            .with_id(id.as_str())
            .with_used_count(used)
            .with_created_at(base + Duration::minutes(i as i64));
        storage.content.insert_content(&item).await.unwrap();
    }
    let h = Harness::new(storage, config).await;

    let mut picked = Vec::new();
    for hour in [5, 6, 7, 8] {
        h.clock.set(local(2024, 1, 15, hour, 0));
        let result = h.orchestrator.trigger().await;
        assert!(result.success, "{result:?}");
        picked.push(result.content_id.unwrap());
    }

    // Unused items oldest first, then the lowest count with ties by age
    assert_eq!(picked, vec!["FP_1-c1", "FP_1-c3", "FP_1-c1", "FP_1-c2"]);

    let mut counts = Vec::new();
    for i in 0..4 {
        let item = h
            .storage
            .content
            .get_content(&format!("FP_1-c{i}"))
            .await
            .unwrap()
            .unwrap();
        counts.push(item.used_count);
    }
    assert_eq!(counts, vec![2, 2, 2, 1]);
}

#[tokio::test]
async fn test_failed_tenant_does_not_affect_others() {
    let h = Harness::seeded(1).await;
    h.publisher.fail_page("page-FP_1");

    let failed = h.orchestrator.trigger().await;
    assert_eq!(failed.error_kind, Some(ErrorKind::Publish));

    h.clock.set(local(2024, 1, 15, 5, 6));
    let next = h.orchestrator.trigger().await;
    assert!(next.success);
    assert_eq!(next.tenant_id.as_deref(), Some("FP_2"));

    // The failed item was not counted and comes up again next cycle
    let item = h.storage.content.get_content("FP_1-c0").await.unwrap().unwrap();
    assert_eq!(item.used_count, 0);

    h.clock.set(local(2024, 1, 15, 6, 0));
    let retry = h.orchestrator.trigger().await;
    assert_eq!(retry.content_id.as_deref(), Some("FP_1-c0"));
    assert_eq!(retry.error_kind, Some(ErrorKind::Publish));
}

#[tokio::test]
async fn test_next_day_restarts_rotation() {
    let h = Harness::seeded(2).await;

    h.clock.set(local(2024, 1, 15, 21, 54));
    let last = h.orchestrator.trigger().await;
    assert_eq!(last.tenant_id.as_deref(), Some("FP_10"));

    h.clock.set(local(2024, 1, 16, 5, 0));
    let first = h.orchestrator.trigger().await;
    assert!(first.success);
    assert_eq!(first.slot_key.as_deref(), Some("20240116-05-00"));
    assert_eq!(first.tenant_id.as_deref(), Some("FP_1"));

    let today = h
        .orchestrator
        .scheduler()
        .day_plan(chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    let tomorrow = h
        .orchestrator
        .scheduler()
        .day_plan(chrono::NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());
    let tenants = |plan: &slotcast::scheduler::DayPlan| {
        plan.slots.iter().map(|s| s.tenant_id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(tenants(&today), tenants(&tomorrow));
}
