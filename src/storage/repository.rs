//! Repository pattern for storage abstraction
//!
//! The orchestrator only talks to these traits. Each trait covers one shared
//! resource, and every mutation that can be contended across concurrent
//! invocations is a single atomic create-if-absent or conditional update,
//! never a read followed by a write.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Repository Traits                         │
//! │  SlotRecord, Lock, Content, Tenant, Settings, Outcome       │
//! └─────────────────────────────────────────────────────────────┘
//!                   │                           │
//!                   ▼                           ▼
//!          ┌─────────────────┐         ┌─────────────────┐
//!          │     SQLite      │         │    In-memory    │
//!          │  SqliteStore    │         │   MemoryStore   │
//!          └─────────────────┘         └─────────────────┘
//! ```

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StoreResult;
use super::memory::MemoryStore;
use super::sqlite::SqliteStore;
use crate::models::{
    ContentItem, LockRecord, PostingOutcome, SlotExecutionRecord, SlotStatus, Tenant,
};

// ============================================================================
// Repository Traits
// ============================================================================

/// Slot execution records (the idempotency markers)
#[async_trait]
pub trait SlotRecordRepository: Send + Sync {
    /// Insert `record` unless a record with the same slot key exists.
    ///
    /// Returns `true` when this call created the record.
    async fn create_slot_record(&self, record: &SlotExecutionRecord) -> StoreResult<bool>;

    async fn get_slot_record(&self, slot_key: &str) -> StoreResult<Option<SlotExecutionRecord>>;

    /// Transition a `running` record to a terminal status.
    ///
    /// Returns `false` if the record was missing or already terminal.
    async fn finish_slot_record(
        &self,
        slot_key: &str,
        status: SlotStatus,
        summary: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Most recently started records first
    async fn recent_slot_records(&self, limit: usize) -> StoreResult<Vec<SlotExecutionRecord>>;

    /// Fail every `running` record started before `started_before`; returns their keys
    async fn fail_stale_slot_records(
        &self,
        started_before: DateTime<Utc>,
        summary: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<String>>;
}

/// Per-tenant, per-period locks
#[async_trait]
pub trait LockRepository: Send + Sync {
    /// Create `lock` if no row with its id exists, or the existing row expired at `now`
    async fn try_acquire_lock(&self, lock: &LockRecord, now: DateTime<Utc>) -> StoreResult<bool>;

    async fn get_lock(&self, lock_id: &str) -> StoreResult<Option<LockRecord>>;

    /// Delete locks expired at `now`; returns how many were removed
    async fn prune_expired_locks(&self, now: DateTime<Utc>) -> StoreResult<usize>;
}

/// Content inventory
#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn insert_content(&self, item: &ContentItem) -> StoreResult<()>;

    async fn get_content(&self, id: &str) -> StoreResult<Option<ContentItem>>;

    /// Tenant's content ordered by `(used_count, created_at, id)` ascending
    async fn list_content_for_tenant(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<ContentItem>>;

    /// Count one use of `content_id`, at most once per `usage_key`.
    ///
    /// Returns `true` if this call incremented the counter.
    async fn increment_usage(
        &self,
        content_id: &str,
        usage_key: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Items of `tenant_id` that were never published
    async fn count_unused_content(&self, tenant_id: &str) -> StoreResult<u64>;
}

/// Tenant records and their credentials
#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn upsert_tenant(&self, tenant: &Tenant) -> StoreResult<()>;

    async fn get_tenant(&self, id: &str) -> StoreResult<Option<Tenant>>;

    async fn list_tenants(&self) -> StoreResult<Vec<Tenant>>;
}

/// Persisted key/value settings (kill switch)
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_setting(&self, key: &str) -> StoreResult<Option<String>>;

    async fn put_setting(&self, key: &str, value: &str, at: DateTime<Utc>) -> StoreResult<()>;
}

/// Append-only posting audit log
#[async_trait]
pub trait OutcomeRepository: Send + Sync {
    async fn append_outcome(&self, outcome: &PostingOutcome) -> StoreResult<()>;

    /// Newest first
    async fn recent_outcomes(&self, limit: usize) -> StoreResult<Vec<PostingOutcome>>;

    async fn outcomes_for_slot(&self, slot_key: &str) -> StoreResult<Vec<PostingOutcome>>;
}

// ============================================================================
// Storage Bundle
// ============================================================================

/// One handle per repository, usually all backed by the same store
#[derive(Clone)]
pub struct Storage {
    pub slots: Arc<dyn SlotRecordRepository>,
    pub locks: Arc<dyn LockRepository>,
    pub content: Arc<dyn ContentRepository>,
    pub tenants: Arc<dyn TenantRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub outcomes: Arc<dyn OutcomeRepository>,
}

impl Storage {
    /// Use one backend for every repository
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: SlotRecordRepository
            + LockRepository
            + ContentRepository
            + TenantRepository
            + SettingsRepository
            + OutcomeRepository
            + 'static,
    {
        Self {
            slots: backend.clone(),
            locks: backend.clone(),
            content: backend.clone(),
            tenants: backend.clone(),
            settings: backend.clone(),
            outcomes: backend,
        }
    }

    /// Open (or create) a SQLite database file
    pub fn sqlite(path: impl AsRef<Path>) -> StoreResult<Self> {
        Ok(Self::from_backend(Arc::new(SqliteStore::open(path)?)))
    }

    /// In-memory SQLite database
    pub fn sqlite_in_memory() -> StoreResult<Self> {
        Ok(Self::from_backend(Arc::new(SqliteStore::in_memory()?)))
    }

    /// Process-local store without SQLite
    pub fn memory() -> Self {
        Self::from_backend(Arc::new(MemoryStore::new()))
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
