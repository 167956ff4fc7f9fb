//! In-memory store
//!
//! Everything lives behind one mutex, so each check-and-set runs as a single
//! critical section. Only suitable for one process.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::{StoreError, StoreResult};
use super::repository::{
    ContentRepository, LockRepository, OutcomeRepository, SettingsRepository,
    SlotRecordRepository, TenantRepository,
};
use crate::models::{ContentItem, LockRecord, PostingOutcome, SlotExecutionRecord, SlotStatus, Tenant};

#[derive(Default)]
struct Inner {
    tenants: HashMap<String, Tenant>,
    content: HashMap<String, ContentItem>,
    usage_marks: HashSet<(String, String)>,
    slot_records: HashMap<String, SlotExecutionRecord>,
    locks: HashMap<String, LockRecord>,
    outcomes: Vec<PostingOutcome>,
    settings: HashMap<String, String>,
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl SlotRecordRepository for MemoryStore {
    async fn create_slot_record(&self, record: &SlotExecutionRecord) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        if inner.slot_records.contains_key(&record.slot_key) {
            return Ok(false);
        }
        inner
            .slot_records
            .insert(record.slot_key.clone(), record.clone());
        Ok(true)
    }

    async fn get_slot_record(&self, slot_key: &str) -> StoreResult<Option<SlotExecutionRecord>> {
        Ok(self.lock()?.slot_records.get(slot_key).cloned())
    }

    async fn finish_slot_record(
        &self,
        slot_key: &str,
        status: SlotStatus,
        summary: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        match inner.slot_records.get_mut(slot_key) {
            Some(record) if record.status == SlotStatus::Running => {
                record.status = status;
                record.completed_at = Some(at);
                record.result_summary = Some(summary.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn recent_slot_records(&self, limit: usize) -> StoreResult<Vec<SlotExecutionRecord>> {
        let inner = self.lock()?;
        let mut records: Vec<_> = inner.slot_records.values().cloned().collect();
        records.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.slot_key.cmp(&a.slot_key))
        });
        records.truncate(limit);
        Ok(records)
    }

    async fn fail_stale_slot_records(
        &self,
        started_before: DateTime<Utc>,
        summary: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<String>> {
        let mut inner = self.lock()?;
        let mut stale: Vec<&mut SlotExecutionRecord> = inner
            .slot_records
            .values_mut()
            .filter(|r| r.status == SlotStatus::Running && r.started_at < started_before)
            .collect();
        stale.sort_by_key(|r| r.started_at);

        let mut keys = Vec::with_capacity(stale.len());
        for record in stale {
            record.status = SlotStatus::Failed;
            record.completed_at = Some(at);
            record.result_summary = Some(summary.to_string());
            keys.push(record.slot_key.clone());
        }
        Ok(keys)
    }
}

#[async_trait]
impl LockRepository for MemoryStore {
    async fn try_acquire_lock(&self, lock: &LockRecord, now: DateTime<Utc>) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        if let Some(existing) = inner.locks.get(&lock.lock_id) {
            if !existing.is_expired(now) {
                return Ok(false);
            }
        }
        inner.locks.insert(lock.lock_id.clone(), lock.clone());
        Ok(true)
    }

    async fn get_lock(&self, lock_id: &str) -> StoreResult<Option<LockRecord>> {
        Ok(self.lock()?.locks.get(lock_id).cloned())
    }

    async fn prune_expired_locks(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut inner = self.lock()?;
        let before = inner.locks.len();
        inner.locks.retain(|_, l| !l.is_expired(now));
        Ok(before - inner.locks.len())
    }
}

#[async_trait]
impl ContentRepository for MemoryStore {
    async fn insert_content(&self, item: &ContentItem) -> StoreResult<()> {
        self.lock()?.content.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get_content(&self, id: &str) -> StoreResult<Option<ContentItem>> {
        Ok(self.lock()?.content.get(id).cloned())
    }

    async fn list_content_for_tenant(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<ContentItem>> {
        let inner = self.lock()?;
        let mut items: Vec<_> = inner
            .content
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.rotation_key().cmp(&b.rotation_key()));
        items.truncate(limit);
        Ok(items)
    }

    async fn increment_usage(
        &self,
        content_id: &str,
        usage_key: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        if !inner.content.contains_key(content_id) {
            return Err(StoreError::not_found("content", content_id));
        }

        let mark = (content_id.to_string(), usage_key.to_string());
        if !inner.usage_marks.insert(mark) {
            return Ok(false);
        }

        if let Some(item) = inner.content.get_mut(content_id) {
            item.used_count = item.used_count.saturating_add(1);
            item.last_used_at = Some(at);
        }
        Ok(true)
    }

    async fn count_unused_content(&self, tenant_id: &str) -> StoreResult<u64> {
        let inner = self.lock()?;
        Ok(inner
            .content
            .values()
            .filter(|c| c.tenant_id == tenant_id && c.used_count == 0)
            .count() as u64)
    }
}

#[async_trait]
impl TenantRepository for MemoryStore {
    async fn upsert_tenant(&self, tenant: &Tenant) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner
            .tenants
            .entry(tenant.id.clone())
            .and_modify(|existing| {
                existing.external_page_id = tenant.external_page_id.clone();
                existing.credential = tenant.credential.clone();
            })
            .or_insert_with(|| tenant.clone());
        Ok(())
    }

    async fn get_tenant(&self, id: &str) -> StoreResult<Option<Tenant>> {
        Ok(self.lock()?.tenants.get(id).cloned())
    }

    async fn list_tenants(&self) -> StoreResult<Vec<Tenant>> {
        let inner = self.lock()?;
        let mut tenants: Vec<_> = inner.tenants.values().cloned().collect();
        tenants.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tenants)
    }
}

#[async_trait]
impl SettingsRepository for MemoryStore {
    async fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.lock()?.settings.get(key).cloned())
    }

    async fn put_setting(&self, key: &str, value: &str, _at: DateTime<Utc>) -> StoreResult<()> {
        self.lock()?
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl OutcomeRepository for MemoryStore {
    async fn append_outcome(&self, outcome: &PostingOutcome) -> StoreResult<()> {
        self.lock()?.outcomes.push(outcome.clone());
        Ok(())
    }

    async fn recent_outcomes(&self, limit: usize) -> StoreResult<Vec<PostingOutcome>> {
        let inner = self.lock()?;
        // Stable sort keeps insertion order for equal timestamps; reverse for newest first
        let mut outcomes = inner.outcomes.clone();
        outcomes.sort_by_key(|o| o.created_at);
        outcomes.reverse();
        outcomes.truncate(limit);
        Ok(outcomes)
    }

    async fn outcomes_for_slot(&self, slot_key: &str) -> StoreResult<Vec<PostingOutcome>> {
        let inner = self.lock()?;
        Ok(inner
            .outcomes
            .iter()
            .filter(|o| o.slot_key == slot_key)
            .cloned()
            .collect())
    }
}
