//! Trigger orchestration
//!
//! One call to [`Orchestrator::trigger`] is one short-lived invocation. It
//! walks a fixed sequence of gates and ends in exactly one terminal result:
//!
//! ```text
//!   RECEIVED
//!     │ kill switch off ─────────────────────────► SKIPPED(disabled)
//!   GATE_CHECKED
//!     │ no slot at this instant ─────────────────► SKIPPED(outside_window)
//!   WINDOW_CHECKED
//!     │ slot key already claimed ────────────────► SKIPPED(already_executed)
//!   SLOT_CLAIMED
//!     │ tenant lock held for this cycle ─────────► SKIPPED(locked)
//!   LOCK_ACQUIRED
//!     │ empty inventory / no credential ─────────► SKIPPED(no_content | no_credentials)
//!   CONTENT_SELECTED
//!     │ download + publish
//!   PUBLISHED
//!     │ outcome, usage, slot record
//!   RECORDED ────────────────────────────────────► SUCCESS | FAILED(ERR_DOWNLOAD | ERR_PUBLISH)
//! ```
//!
//! Store errors anywhere end in `FAILED(ERR_UNKNOWN)`. The whole walk runs
//! under the invocation deadline; expiry ends in `FAILED(ERR_TIMEOUT)` and
//! leaves a claimed slot record `running` for the [`Reconciler`] to close.
//!
//! Skips after the slot claim close the record as `completed` with a
//! `skipped:<reason>` summary so the slot is never retried.

pub mod gate;
pub mod kill_switch;
pub mod lock;
pub mod reconciler;
pub mod recorder;
pub mod selector;
pub mod stock;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::clock::{SharedClock, SystemClock};
use crate::config::Config;
use crate::models::{ContentItem, ErrorKind, SkipReason};
use crate::publisher::{
    GraphApiClient, HttpPayloadFetcher, PayloadFetcher, PostingClient, PublishError,
    PublishReceipt, PublishRequest,
};
use crate::scheduler::{Slot, SlotScheduler};
use crate::storage::{Storage, StoreError};

pub use gate::IdempotencyGate;
pub use kill_switch::KillSwitch;
pub use lock::LockManager;
pub use reconciler::{Reconciler, SweepReport};
pub use recorder::{OutcomeRecorder, PublishResult};
pub use selector::ContentSelector;
pub use stock::{StockReport, TenantStock};

/// Budget kept back from external calls so the outcome can still be written
const RECORD_RESERVE: Duration = Duration::from_secs(2);

/// Smallest budget handed to an external call
const MIN_CALL_BUDGET: Duration = Duration::from_millis(100);

// ============================================================================
// Dependencies
// ============================================================================

/// Everything the orchestrator talks to, built once at process start
#[derive(Clone)]
pub struct Dependencies {
    pub storage: Storage,
    pub publisher: Arc<dyn PostingClient>,
    pub fetcher: Arc<dyn PayloadFetcher>,
    pub clock: SharedClock,
}

impl Dependencies {
    /// SQLite store, Graph API client, HTTP fetcher and the system clock
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        let storage = Storage::sqlite(&config.storage.sqlite_path)?;
        let publisher = GraphApiClient::new(&config.publisher)?;
        let fetcher = HttpPayloadFetcher::new(&config.publisher)?;

        Ok(Self {
            storage,
            publisher: Arc::new(publisher),
            fetcher: Arc::new(fetcher),
            clock: Arc::new(SystemClock),
        })
    }
}

// ============================================================================
// Trigger Result
// ============================================================================

/// Furthest state an invocation reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    #[default]
    Received,
    GateChecked,
    WindowChecked,
    SlotClaimed,
    LockAcquired,
    ContentSelected,
    Published,
    Recorded,
}

/// Structured result of one invocation, returned to the trigger caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResult {
    /// A publish was attempted (or was in flight when the deadline hit)
    pub executed: bool,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub detail: String,
    pub stage: Stage,
    pub duration_ms: u64,
    pub invocation_id: String,
}

impl TriggerResult {
    /// `success`, `failed` or `skipped`
    pub fn outcome_label(&self) -> &'static str {
        if self.success {
            "success"
        } else if self.error_kind.is_some() {
            "failed"
        } else {
            "skipped"
        }
    }

    /// Skip reason or error kind, for metrics labels
    pub fn reason_label(&self) -> &'static str {
        match (self.reason, self.error_kind) {
            (Some(reason), _) => reason.as_str(),
            (None, Some(kind)) => kind.as_str(),
            (None, None) => "published",
        }
    }
}

/// What an invocation knows about itself so far. Kept outside the deadline
/// future so a timed out invocation can still report its slot.
#[derive(Debug, Default)]
struct Progress {
    stage: Stage,
    slot_key: Option<String>,
    tenant_id: Option<String>,
    content_id: Option<String>,
}

/// Terminal result produced inside the deadline
enum Terminal {
    Skipped(SkipReason),
    Finished {
        post_id: Option<String>,
        failure: Option<(ErrorKind, String)>,
    },
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    scheduler: SlotScheduler,
    storage: Storage,
    kill_switch: KillSwitch,
    gate: IdempotencyGate,
    locks: LockManager,
    selector: ContentSelector,
    recorder: OutcomeRecorder,
    reconciler: Reconciler,
    publisher: Arc<dyn PostingClient>,
    fetcher: Arc<dyn PayloadFetcher>,
    clock: SharedClock,
    deadline: Duration,
}

impl Orchestrator {
    /// Validate `config` and wire the components over `deps`
    pub fn new(config: &Config, deps: Dependencies) -> crate::error::Result<Self> {
        config.validate()?;
        let scheduler = config.scheduler()?;
        let lock_ttl = config.orchestrator.lock_ttl(&scheduler);

        let Dependencies {
            storage,
            publisher,
            fetcher,
            clock,
        } = deps;

        let gate = IdempotencyGate::new(storage.slots.clone());
        let recorder =
            OutcomeRecorder::new(storage.outcomes.clone(), storage.content.clone(), gate.clone());
        let reconciler = Reconciler::new(
            storage.slots.clone(),
            storage.locks.clone(),
            clock.clone(),
            config.orchestrator.stale_after(),
        );

        tracing::debug!(
            roster = scheduler.roster().len(),
            lock_ttl_minutes = lock_ttl.num_minutes(),
            deadline_secs = config.orchestrator.invocation_deadline_secs,
            "Orchestrator ready"
        );

        Ok(Self {
            kill_switch: KillSwitch::new(storage.settings.clone()),
            locks: LockManager::new(storage.locks.clone(), lock_ttl),
            selector: ContentSelector::new(storage.content.clone()),
            gate,
            recorder,
            reconciler,
            scheduler,
            storage,
            publisher,
            fetcher,
            clock,
            deadline: config.orchestrator.invocation_deadline(),
        })
    }

    pub fn scheduler(&self) -> &SlotScheduler {
        &self.scheduler
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn kill_switch(&self) -> &KillSwitch {
        &self.kill_switch
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Close abandoned `running` records and prune expired locks
    pub async fn sweep(&self) -> Result<SweepReport, StoreError> {
        self.reconciler.sweep().await
    }

    pub async fn stock_report(&self, duration_days: u32) -> Result<StockReport, StoreError> {
        stock::stock_report(
            &self.scheduler,
            self.storage.content.as_ref(),
            duration_days,
            self.clock.now(),
        )
        .await
    }

    /// Run one invocation for the current instant
    pub async fn trigger(&self) -> TriggerResult {
        self.trigger_at(self.clock.now()).await
    }

    /// Run one invocation as if triggered at `at`. Persisted timestamps still
    /// come from the clock.
    pub async fn trigger_at(&self, at: DateTime<Utc>) -> TriggerResult {
        let started = Instant::now();
        let deadline = started + self.deadline;
        let invocation_id = uuid::Uuid::new_v4().to_string();
        let progress = Mutex::new(Progress::default());

        let run = self.run(at, &invocation_id, deadline, &progress);
        let terminal = match tokio::time::timeout_at(deadline, run).await {
            Ok(Ok(terminal)) => Ok(terminal),
            Ok(Err(err)) => Err(Some(err)),
            Err(_) => Err(None),
        };

        let progress = match progress.into_inner() {
            Ok(progress) => progress,
            Err(poisoned) => poisoned.into_inner(),
        };

        let result = match terminal {
            Ok(terminal) => self.finish(terminal, progress, &invocation_id, started),
            Err(None) => self.timed_out(progress, &invocation_id, started),
            Err(Some(err)) => self.unknown_failure(err, progress, &invocation_id, started).await,
        };

        crate::metrics::record_invocation(result.outcome_label(), result.reason_label());
        if let Some(kind) = result.error_kind {
            crate::metrics::record_failure(kind.as_str());
        }
        result
    }

    async fn run(
        &self,
        at: DateTime<Utc>,
        invocation_id: &str,
        deadline: Instant,
        progress: &Mutex<Progress>,
    ) -> Result<Terminal, StoreError> {
        if !self.kill_switch.is_enabled().await? {
            return Ok(Terminal::Skipped(SkipReason::Disabled));
        }
        advance(progress, Stage::GateChecked, |_| {});

        let Some(slot) = self.scheduler.slot_at(at) else {
            return Ok(Terminal::Skipped(SkipReason::OutsideWindow));
        };
        advance(progress, Stage::WindowChecked, |p| {
            p.slot_key = Some(slot.slot_key.clone());
            p.tenant_id = Some(slot.tenant_id.clone());
        });

        if !self
            .gate
            .claim(&slot.slot_key, &slot.tenant_id, self.clock.now())
            .await?
        {
            return Ok(Terminal::Skipped(SkipReason::AlreadyExecuted));
        }
        advance(progress, Stage::SlotClaimed, |_| {});
        tracing::debug!(slot_key = %slot.slot_key, tenant_id = %slot.tenant_id, invocation_id, "Slot claimed");

        let period = slot.lock_period();
        if !self
            .locks
            .acquire(&slot.tenant_id, &period, invocation_id, self.clock.now())
            .await?
        {
            return self.skip_claimed(&slot, SkipReason::Locked).await;
        }
        advance(progress, Stage::LockAcquired, |_| {});

        let Some(item) = self.selector.next(&slot.tenant_id).await? else {
            return self.skip_claimed(&slot, SkipReason::NoContent).await;
        };

        let tenant = self.storage.tenants.get_tenant(&slot.tenant_id).await?;
        let Some((page_id, credential)) = tenant.as_ref().and_then(|t| {
            t.usable_credential()
                .map(|credential| (t.external_page_id.clone(), credential.to_string()))
        }) else {
            return self.skip_claimed(&slot, SkipReason::NoCredentials).await;
        };
        advance(progress, Stage::ContentSelected, |p| {
            p.content_id = Some(item.id.clone());
        });
        tracing::debug!(slot_key = %slot.slot_key, content_id = %item.id, "Content selected");

        let publish_started = Instant::now();
        let publish = self.publish(&item, page_id, credential, deadline).await;
        let duration_ms = publish_started.elapsed().as_millis() as u64;
        advance(progress, Stage::Published, |_| {});
        crate::metrics::record_publish_duration(&slot.tenant_id, duration_ms as f64 / 1000.0);

        let (result, post_id, failure) = match publish {
            Ok(receipt) => (
                PublishResult::Published {
                    external_post_id: receipt.external_post_id.clone(),
                },
                Some(receipt.external_post_id),
                None,
            ),
            Err(err) => {
                let kind = err.error_kind();
                let message = err.to_string();
                (
                    PublishResult::Failed {
                        kind,
                        message: message.clone(),
                    },
                    None,
                    Some((kind, message)),
                )
            }
        };

        self.recorder
            .record(
                &slot.slot_key,
                &slot.tenant_id,
                &item.id,
                &result,
                duration_ms,
                self.clock.now(),
            )
            .await?;
        advance(progress, Stage::Recorded, |_| {});

        Ok(Terminal::Finished { post_id, failure })
    }

    /// Download the payload then publish it, each within what is left of the deadline
    async fn publish(
        &self,
        item: &ContentItem,
        page_id: String,
        credential: String,
        deadline: Instant,
    ) -> Result<PublishReceipt, PublishError> {
        let payload = self
            .fetcher
            .fetch(&item.payload_ref, call_budget(deadline))
            .await?;

        let request = PublishRequest {
            page_id,
            credential,
            payload,
            caption: item.caption.clone(),
        };
        self.publisher.publish(request, call_budget(deadline)).await
    }

    async fn skip_claimed(&self, slot: &Slot, reason: SkipReason) -> Result<Terminal, StoreError> {
        self.gate
            .complete(&slot.slot_key, &format!("skipped:{reason}"), self.clock.now())
            .await?;
        Ok(Terminal::Skipped(reason))
    }

    fn finish(
        &self,
        terminal: Terminal,
        progress: Progress,
        invocation_id: &str,
        started: Instant,
    ) -> TriggerResult {
        let mut result = base_result(progress, invocation_id, started);

        match terminal {
            Terminal::Skipped(reason) => {
                result.reason = Some(reason);
                result.detail = reason.message().to_string();
                tracing::info!(
                    reason = %reason,
                    slot_key = result.slot_key.as_deref().unwrap_or("-"),
                    tenant_id = result.tenant_id.as_deref().unwrap_or("-"),
                    "Trigger skipped"
                );
            }
            Terminal::Finished {
                post_id,
                failure: None,
            } => {
                result.executed = true;
                result.success = true;
                result.detail = format!(
                    "Published to {}",
                    result.tenant_id.as_deref().unwrap_or("tenant")
                );
                result.post_id = post_id;
                tracing::info!(
                    slot_key = result.slot_key.as_deref().unwrap_or("-"),
                    tenant_id = result.tenant_id.as_deref().unwrap_or("-"),
                    content_id = result.content_id.as_deref().unwrap_or("-"),
                    post_id = result.post_id.as_deref().unwrap_or("-"),
                    duration_ms = result.duration_ms,
                    "Published"
                );
            }
            Terminal::Finished {
                failure: Some((kind, message)),
                ..
            } => {
                result.executed = true;
                result.detail = format!("Publish attempt failed with {kind}");
                result.error_kind = Some(kind);
                tracing::warn!(
                    error_kind = %kind,
                    slot_key = result.slot_key.as_deref().unwrap_or("-"),
                    tenant_id = result.tenant_id.as_deref().unwrap_or("-"),
                    content_id = result.content_id.as_deref().unwrap_or("-"),
                    duration_ms = result.duration_ms,
                    error = %message,
                    "Publish failed"
                );
                result.error_message = Some(message);
            }
        }

        result
    }

    fn timed_out(&self, progress: Progress, invocation_id: &str, started: Instant) -> TriggerResult {
        let stage = progress.stage;
        let mut result = base_result(progress, invocation_id, started);
        result.executed = stage >= Stage::SlotClaimed;
        result.error_kind = Some(ErrorKind::Timeout);
        result.error_message = Some(format!(
            "Invocation deadline of {}s exceeded after {stage:?}",
            self.deadline.as_secs()
        ));
        result.detail = "Deadline exceeded; slot outcome is indeterminate".to_string();

        tracing::warn!(
            slot_key = result.slot_key.as_deref().unwrap_or("-"),
            tenant_id = result.tenant_id.as_deref().unwrap_or("-"),
            stage = ?stage,
            duration_ms = result.duration_ms,
            "Invocation deadline exceeded"
        );
        result
    }

    async fn unknown_failure(
        &self,
        err: StoreError,
        progress: Progress,
        invocation_id: &str,
        started: Instant,
    ) -> TriggerResult {
        let stage = progress.stage;
        let mut result = base_result(progress, invocation_id, started);
        result.executed = stage >= Stage::SlotClaimed;
        result.error_kind = Some(ErrorKind::Unknown);
        result.error_message = Some(err.to_string());
        result.detail = "Unexpected internal error".to_string();

        tracing::error!(
            error = %err,
            slot_key = result.slot_key.as_deref().unwrap_or("-"),
            tenant_id = result.tenant_id.as_deref().unwrap_or("-"),
            stage = ?stage,
            invocation_id,
            "Trigger failed unexpectedly"
        );

        if let Some(slot_key) = result.slot_key.as_deref().filter(|_| result.executed) {
            let summary = format!("{}: {err}", ErrorKind::Unknown);
            if let Err(mark_err) = self.gate.fail(slot_key, &summary, self.clock.now()).await {
                tracing::error!(slot_key, error = %mark_err, "Could not mark slot failed");
            }
        }

        result
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("scheduler", &self.scheduler)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

fn advance(progress: &Mutex<Progress>, stage: Stage, update: impl FnOnce(&mut Progress)) {
    let mut guard = match progress.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.stage = stage;
    update(&mut guard);
}

fn call_budget(deadline: Instant) -> Duration {
    deadline
        .saturating_duration_since(Instant::now())
        .saturating_sub(RECORD_RESERVE)
        .max(MIN_CALL_BUDGET)
}

fn base_result(progress: Progress, invocation_id: &str, started: Instant) -> TriggerResult {
    TriggerResult {
        executed: false,
        success: false,
        reason: None,
        slot_key: progress.slot_key,
        tenant_id: progress.tenant_id,
        content_id: progress.content_id,
        post_id: None,
        error_kind: None,
        error_message: None,
        detail: String::new(),
        stage: progress.stage,
        duration_ms: started.elapsed().as_millis() as u64,
        invocation_id: invocation_id.to_string(),
    }
}
