//! Common test utilities

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};

use slotcast::clock::FixedClock;
use slotcast::config::Config;
use slotcast::models::{ContentItem, Tenant};
use slotcast::orchestrator::{Dependencies, Orchestrator};
use slotcast::publisher::{
    PayloadFetcher, PostingClient, PublishError, PublishReceipt, PublishRequest,
};
use slotcast::storage::{ContentRepository, Storage, TenantRepository};

/// Default schedule offset (UTC+7)
pub const OFFSET_SECS: i32 = 7 * 3600;

/// Local wall-clock time in the default offset, as UTC
pub fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    FixedOffset::east_opt(OFFSET_SECS)
        .unwrap()
        .with_ymd_and_hms(y, m, d, h, min, 0)
        .unwrap()
        .with_timezone(&Utc)
}

// ============================================================================
// Fakes
// ============================================================================

/// Publisher that records every call and fails for selected pages
#[derive(Default)]
pub struct FakePublisher {
    calls: AtomicUsize,
    published: Mutex<Vec<(String, String)>>,
    failing_pages: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl FakePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every publish sleeps for `delay` before answering
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_page(&self, page_id: &str) {
        self.failing_pages.lock().unwrap().insert(page_id.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `(page_id, caption)` of every successful publish, in order
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostingClient for FakePublisher {
    async fn publish(
        &self,
        request: PublishRequest,
        _timeout: Duration,
    ) -> Result<PublishReceipt, PublishError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_pages.lock().unwrap().contains(&request.page_id) {
            return Err(PublishError::Api {
                code: 190,
                status: 400,
                message: "Error validating access token".to_string(),
            });
        }

        self.published
            .lock()
            .unwrap()
            .push((request.page_id.clone(), request.caption.clone()));
        Ok(PublishReceipt {
            external_post_id: format!("{}_post_{n}", request.page_id),
        })
    }
}

/// Fetcher serving fixed bytes, failing for selected refs
#[derive(Default)]
pub struct FakeFetcher {
    failing_refs: Mutex<HashSet<String>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_ref(&self, payload_ref: &str) {
        self.failing_refs.lock().unwrap().insert(payload_ref.to_string());
    }
}

#[async_trait]
impl PayloadFetcher for FakeFetcher {
    async fn fetch(&self, payload_ref: &str, _timeout: Duration) -> Result<Bytes, PublishError> {
        if self.failing_refs.lock().unwrap().contains(payload_ref) {
            return Err(PublishError::download(payload_ref, "HTTP 404", Some(404)));
        }
        Ok(Bytes::from_static(b"\xFF\xD8\xFF\xE0fake-jpeg"))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub orchestrator: Arc<Orchestrator>,
    pub storage: Storage,
    pub clock: Arc<FixedClock>,
    pub publisher: Arc<FakePublisher>,
    pub fetcher: Arc<FakeFetcher>,
}

impl Harness {
    pub async fn new(storage: Storage, config: Config) -> Self {
        Self::with_publisher(storage, config, FakePublisher::new()).await
    }

    pub async fn with_publisher(storage: Storage, config: Config, publisher: FakePublisher) -> Self {
        let clock = Arc::new(FixedClock::new(local(2024, 1, 15, 5, 0)));
        let publisher = Arc::new(publisher);
        let fetcher = Arc::new(FakeFetcher::new());

        let deps = Dependencies {
            storage: storage.clone(),
            publisher: publisher.clone(),
            fetcher: fetcher.clone(),
            clock: clock.clone(),
        };
        let orchestrator = Arc::new(Orchestrator::new(&config, deps).unwrap());

        Self {
            orchestrator,
            storage,
            clock,
            publisher,
            fetcher,
        }
    }

    /// Memory store with every roster tenant credentialed and stocked
    pub async fn seeded(items_per_tenant: usize) -> Self {
        let config = Config::default();
        let storage = Storage::memory();
        seed_tenants(&storage, &config.roster.tenants).await;
        for tenant in &config.roster.tenants {
            seed_content(&storage, tenant, items_per_tenant).await;
        }
        Self::new(storage, config).await
    }
}

pub fn page_id(tenant_id: &str) -> String {
    format!("page-{tenant_id}")
}

pub async fn seed_tenants(storage: &Storage, roster: &[String]) {
    for id in roster {
        let tenant = Tenant::new(id.as_str(), page_id(id)).with_credential(format!("token-{id}"));
        storage.tenants.upsert_tenant(&tenant).await.unwrap();
    }
}

/// Items `{tenant}-c0..n`, oldest first
pub async fn seed_content(storage: &Storage, tenant_id: &str, n: usize) -> Vec<String> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut ids = Vec::with_capacity(n);
    for i in 0..n {
        let id = format!("{tenant_id}-c{i}");
        let item = ContentItem::new(tenant_id, format!("ref-{id}"), format!("caption {id}"))
            .with_id(id.as_str())
            .with_created_at(base + chrono::Duration::minutes(i as i64));
        storage.content.insert_content(&item).await.unwrap();
        ids.push(id);
    }
    ids
}
