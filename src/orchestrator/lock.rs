//! Per-tenant, per-period execution locks
//!
//! Second line of defence behind the slot gate: even if two callers disagree
//! on the slot key (clock skew, a changed slot length), a tenant can only run
//! once per rotation cycle. Locks expire after a TTL so a crashed holder
//! cannot block the tenant for longer than that.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::models::LockRecord;
use crate::storage::{LockRepository, StoreResult};

/// Lock id for a tenant and period
pub fn lock_id(tenant_id: &str, period: &str) -> String {
    format!("{tenant_id}:{period}")
}

#[derive(Clone)]
pub struct LockManager {
    locks: Arc<dyn LockRepository>,
    ttl: Duration,
}

impl LockManager {
    pub fn new(locks: Arc<dyn LockRepository>, ttl: Duration) -> Self {
        Self { locks, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Try to take the lock for `tenant_id` in `period`; `false` if a live lock exists
    pub async fn acquire(
        &self,
        tenant_id: &str,
        period: &str,
        holder: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let lock = LockRecord {
            lock_id: lock_id(tenant_id, period),
            tenant_id: tenant_id.to_string(),
            holder: holder.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
        };

        let acquired = self.locks.try_acquire_lock(&lock, now).await?;
        tracing::debug!(lock_id = %lock.lock_id, holder, acquired, "Lock acquisition");
        Ok(acquired)
    }
}
