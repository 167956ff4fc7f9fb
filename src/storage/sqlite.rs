//! SQLite-backed store
//!
//! A single connection guarded by a mutex; queries run on the blocking pool so
//! the async orchestrator can put a deadline around them. Atomicity of the
//! contended operations comes from single statements:
//!
//! - slot claim: `INSERT .. ON CONFLICT DO NOTHING`, success iff one row changed
//! - lock acquire: upsert whose update branch only fires on an expired row
//! - usage count: usage mark insert and counter bump in one transaction

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::error::{StoreError, StoreResult};
use super::repository::{
    ContentRepository, LockRepository, OutcomeRepository, SettingsRepository,
    SlotRecordRepository, TenantRepository,
};
use crate::models::{
    ContentItem, ErrorKind, LockRecord, PostingOutcome, SlotExecutionRecord, SlotStatus, Tenant,
};

/// Store backed by one SQLite database
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )?;
        Self::create_schema(&conn)?;

        tracing::info!(path = %path.display(), "SQLite store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Fresh in-memory database (tests, dry runs)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                external_page_id TEXT NOT NULL,
                credential TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS content (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                payload_ref TEXT NOT NULL,
                caption TEXT NOT NULL DEFAULT '',
                used_count INTEGER NOT NULL DEFAULT 0,
                last_used_at TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_content_rotation
                ON content(tenant_id, used_count, created_at);

            CREATE TABLE IF NOT EXISTS content_usage (
                content_id TEXT NOT NULL,
                usage_key TEXT NOT NULL,
                used_at TEXT NOT NULL,
                PRIMARY KEY (content_id, usage_key)
            );

            CREATE TABLE IF NOT EXISTS slot_runs (
                slot_key TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                result_summary TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_slot_runs_status
                ON slot_runs(status, started_at);

            CREATE TABLE IF NOT EXISTS locks (
                lock_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                holder TEXT NOT NULL,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS posting_outcomes (
                id TEXT PRIMARY KEY,
                slot_key TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                content_id TEXT NOT NULL,
                success INTEGER NOT NULL,
                external_post_id TEXT,
                error_kind TEXT,
                error_message TEXT,
                duration_ms INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_outcomes_slot ON posting_outcomes(slot_key);
            CREATE INDEX IF NOT EXISTS idx_outcomes_created ON posting_outcomes(created_at);

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// ============================================================================
// Row mapping
// ============================================================================

/// Fixed-width timestamps so text ordering matches time ordering
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(column: &'static str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::corrupt(column, value))
}

fn parse_opt_ts(column: &'static str, value: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(column, &v)).transpose()
}

fn tenant_from_row(row: &Row<'_>) -> StoreResult<Tenant> {
    let created_at: String = row.get("created_at")?;
    Ok(Tenant {
        id: row.get("id")?,
        external_page_id: row.get("external_page_id")?,
        credential: row.get("credential")?,
        created_at: parse_ts("created_at", &created_at)?,
    })
}

fn content_from_row(row: &Row<'_>) -> StoreResult<ContentItem> {
    let created_at: String = row.get("created_at")?;
    let used_count: i64 = row.get("used_count")?;
    Ok(ContentItem {
        id: row.get("id")?,
        tenant_id: row.get("tenant_id")?,
        payload_ref: row.get("payload_ref")?,
        caption: row.get("caption")?,
        used_count: u32::try_from(used_count)
            .map_err(|_| StoreError::corrupt("used_count", used_count.to_string()))?,
        last_used_at: parse_opt_ts("last_used_at", row.get("last_used_at")?)?,
        created_at: parse_ts("created_at", &created_at)?,
    })
}

fn slot_record_from_row(row: &Row<'_>) -> StoreResult<SlotExecutionRecord> {
    let status: String = row.get("status")?;
    let started_at: String = row.get("started_at")?;
    Ok(SlotExecutionRecord {
        slot_key: row.get("slot_key")?,
        status: status
            .parse::<SlotStatus>()
            .map_err(|_| StoreError::corrupt("status", status.clone()))?,
        tenant_id: row.get("tenant_id")?,
        started_at: parse_ts("started_at", &started_at)?,
        completed_at: parse_opt_ts("completed_at", row.get("completed_at")?)?,
        result_summary: row.get("result_summary")?,
    })
}

fn lock_from_row(row: &Row<'_>) -> StoreResult<LockRecord> {
    let created_at: String = row.get("created_at")?;
    let expires_at: String = row.get("expires_at")?;
    Ok(LockRecord {
        lock_id: row.get("lock_id")?,
        tenant_id: row.get("tenant_id")?,
        holder: row.get("holder")?,
        created_at: parse_ts("created_at", &created_at)?,
        expires_at: parse_ts("expires_at", &expires_at)?,
    })
}

fn outcome_from_row(row: &Row<'_>) -> StoreResult<PostingOutcome> {
    let created_at: String = row.get("created_at")?;
    let duration_ms: i64 = row.get("duration_ms")?;
    let error_kind: Option<String> = row.get("error_kind")?;
    let error_kind = error_kind
        .map(|k| {
            k.parse::<ErrorKind>()
                .map_err(|_| StoreError::corrupt("error_kind", k.clone()))
        })
        .transpose()?;

    Ok(PostingOutcome {
        id: row.get("id")?,
        slot_key: row.get("slot_key")?,
        tenant_id: row.get("tenant_id")?,
        content_id: row.get("content_id")?,
        success: row.get::<_, i64>("success")? != 0,
        external_post_id: row.get("external_post_id")?,
        error_kind,
        error_message: row.get("error_message")?,
        duration_ms: u64::try_from(duration_ms).unwrap_or_default(),
        created_at: parse_ts("created_at", &created_at)?,
    })
}

/// Collect rows through a fallible mapper
fn collect_rows<T>(
    stmt: &mut rusqlite::Statement<'_>,
    params: impl rusqlite::Params,
    map: fn(&Row<'_>) -> StoreResult<T>,
) -> StoreResult<Vec<T>> {
    let mut rows = stmt.query(params)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(map(row)?);
    }
    Ok(out)
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// ============================================================================
// Repository implementations
// ============================================================================

#[async_trait]
impl SlotRecordRepository for SqliteStore {
    async fn create_slot_record(&self, record: &SlotExecutionRecord) -> StoreResult<bool> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "INSERT INTO slot_runs (slot_key, status, tenant_id, started_at, completed_at, result_summary)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(slot_key) DO NOTHING",
                params![
                    record.slot_key,
                    record.status.as_str(),
                    record.tenant_id,
                    ts(record.started_at),
                    record.completed_at.map(ts),
                    record.result_summary,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn get_slot_record(&self, slot_key: &str) -> StoreResult<Option<SlotExecutionRecord>> {
        let slot_key = slot_key.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT * FROM slot_runs WHERE slot_key = ?1")?;
            let mut rows = collect_rows(&mut stmt, params![slot_key], slot_record_from_row)?;
            Ok(rows.pop())
        })
        .await
    }

    async fn finish_slot_record(
        &self,
        slot_key: &str,
        status: SlotStatus,
        summary: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let slot_key = slot_key.to_string();
        let summary = summary.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE slot_runs SET status = ?2, completed_at = ?3, result_summary = ?4
                 WHERE slot_key = ?1 AND status = 'running'",
                params![slot_key, status.as_str(), ts(at), summary],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn recent_slot_records(&self, limit: usize) -> StoreResult<Vec<SlotExecutionRecord>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM slot_runs ORDER BY started_at DESC, slot_key DESC LIMIT ?1",
            )?;
            collect_rows(&mut stmt, params![sql_limit(limit)], slot_record_from_row)
        })
        .await
    }

    async fn fail_stale_slot_records(
        &self,
        started_before: DateTime<Utc>,
        summary: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<String>> {
        let summary = summary.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let keys = {
                let mut stmt = tx.prepare(
                    "SELECT slot_key FROM slot_runs
                     WHERE status = 'running' AND started_at < ?1
                     ORDER BY started_at",
                )?;
                let keys = stmt
                    .query_map(params![ts(started_before)], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                keys
            };
            for key in &keys {
                tx.execute(
                    "UPDATE slot_runs SET status = 'failed', completed_at = ?2, result_summary = ?3
                     WHERE slot_key = ?1 AND status = 'running'",
                    params![key, ts(at), summary],
                )?;
            }
            tx.commit()?;
            Ok(keys)
        })
        .await
    }
}

#[async_trait]
impl LockRepository for SqliteStore {
    async fn try_acquire_lock(&self, lock: &LockRecord, now: DateTime<Utc>) -> StoreResult<bool> {
        let lock = lock.clone();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "INSERT INTO locks (lock_id, tenant_id, holder, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(lock_id) DO UPDATE SET
                     tenant_id = excluded.tenant_id,
                     holder = excluded.holder,
                     created_at = excluded.created_at,
                     expires_at = excluded.expires_at
                 WHERE locks.expires_at <= ?6",
                params![
                    lock.lock_id,
                    lock.tenant_id,
                    lock.holder,
                    ts(lock.created_at),
                    ts(lock.expires_at),
                    ts(now),
                ],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn get_lock(&self, lock_id: &str) -> StoreResult<Option<LockRecord>> {
        let lock_id = lock_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT * FROM locks WHERE lock_id = ?1")?;
            let mut rows = collect_rows(&mut stmt, params![lock_id], lock_from_row)?;
            Ok(rows.pop())
        })
        .await
    }

    async fn prune_expired_locks(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM locks WHERE expires_at <= ?1", params![ts(now)])?;
            Ok(removed)
        })
        .await
    }
}

#[async_trait]
impl ContentRepository for SqliteStore {
    async fn insert_content(&self, item: &ContentItem) -> StoreResult<()> {
        let item = item.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO content (id, tenant_id, payload_ref, caption, used_count, last_used_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    item.id,
                    item.tenant_id,
                    item.payload_ref,
                    item.caption,
                    i64::from(item.used_count),
                    item.last_used_at.map(ts),
                    ts(item.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_content(&self, id: &str) -> StoreResult<Option<ContentItem>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT * FROM content WHERE id = ?1")?;
            let mut rows = collect_rows(&mut stmt, params![id], content_from_row)?;
            Ok(rows.pop())
        })
        .await
    }

    async fn list_content_for_tenant(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<ContentItem>> {
        let tenant_id = tenant_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM content WHERE tenant_id = ?1
                 ORDER BY used_count ASC, created_at ASC, id ASC
                 LIMIT ?2",
            )?;
            collect_rows(&mut stmt, params![tenant_id, sql_limit(limit)], content_from_row)
        })
        .await
    }

    async fn increment_usage(
        &self,
        content_id: &str,
        usage_key: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let content_id = content_id.to_string();
        let usage_key = usage_key.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;

            let exists = tx
                .query_row(
                    "SELECT 1 FROM content WHERE id = ?1",
                    params![content_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !exists {
                return Err(StoreError::not_found("content", content_id));
            }

            let marked = tx.execute(
                "INSERT INTO content_usage (content_id, usage_key, used_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(content_id, usage_key) DO NOTHING",
                params![content_id, usage_key, ts(at)],
            )?;
            if marked == 1 {
                tx.execute(
                    "UPDATE content SET used_count = used_count + 1, last_used_at = ?2 WHERE id = ?1",
                    params![content_id, ts(at)],
                )?;
            }

            tx.commit()?;
            Ok(marked == 1)
        })
        .await
    }

    async fn count_unused_content(&self, tenant_id: &str) -> StoreResult<u64> {
        let tenant_id = tenant_id.to_string();
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM content WHERE tenant_id = ?1 AND used_count = 0",
                params![tenant_id],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
        .await
    }
}

#[async_trait]
impl TenantRepository for SqliteStore {
    async fn upsert_tenant(&self, tenant: &Tenant) -> StoreResult<()> {
        let tenant = tenant.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tenants (id, external_page_id, credential, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     external_page_id = excluded.external_page_id,
                     credential = excluded.credential",
                params![
                    tenant.id,
                    tenant.external_page_id,
                    tenant.credential,
                    ts(tenant.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_tenant(&self, id: &str) -> StoreResult<Option<Tenant>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare("SELECT * FROM tenants WHERE id = ?1")?;
            let mut rows = collect_rows(&mut stmt, params![id], tenant_from_row)?;
            Ok(rows.pop())
        })
        .await
    }

    async fn list_tenants(&self) -> StoreResult<Vec<Tenant>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM tenants ORDER BY id")?;
            collect_rows(&mut stmt, [], tenant_from_row)
        })
        .await
    }
}

#[async_trait]
impl SettingsRepository for SqliteStore {
    async fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn put_setting(&self, key: &str, value: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, ts(at)],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl OutcomeRepository for SqliteStore {
    async fn append_outcome(&self, outcome: &PostingOutcome) -> StoreResult<()> {
        let outcome = outcome.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO posting_outcomes
                    (id, slot_key, tenant_id, content_id, success, external_post_id,
                     error_kind, error_message, duration_ms, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    outcome.id,
                    outcome.slot_key,
                    outcome.tenant_id,
                    outcome.content_id,
                    outcome.success,
                    outcome.external_post_id,
                    outcome.error_kind.map(|k| k.as_str()),
                    outcome.error_message,
                    i64::try_from(outcome.duration_ms).unwrap_or(i64::MAX),
                    ts(outcome.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn recent_outcomes(&self, limit: usize) -> StoreResult<Vec<PostingOutcome>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM posting_outcomes ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            )?;
            collect_rows(&mut stmt, params![sql_limit(limit)], outcome_from_row)
        })
        .await
    }

    async fn outcomes_for_slot(&self, slot_key: &str) -> StoreResult<Vec<PostingOutcome>> {
        let slot_key = slot_key.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM posting_outcomes WHERE slot_key = ?1 ORDER BY created_at, rowid",
            )?;
            collect_rows(&mut stmt, params![slot_key], outcome_from_row)
        })
        .await
    }
}
