//! Core data structures shared across the orchestrator, storage and HTTP layers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Tenant
// ============================================================================

/// A roster member ("page") that receives published content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Roster identifier (e.g. `FP_1`)
    pub id: String,

    /// Identifier of the page on the external publishing platform
    pub external_page_id: String,

    /// Publishing credential; `None` or empty means the tenant cannot post
    #[serde(skip_serializing)]
    pub credential: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(id: impl Into<String>, external_page_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            external_page_id: external_page_id.into(),
            credential: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Usable credential, ignoring blank values
    pub fn usable_credential(&self) -> Option<&str> {
        self.credential
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

// ============================================================================
// Content Item
// ============================================================================

/// A publishable item belonging to one tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub tenant_id: String,

    /// Where the binary payload can be downloaded from
    pub payload_ref: String,

    pub caption: String,
    pub used_count: u32,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ContentItem {
    /// Create a never-used item with a fresh id
    pub fn new(
        tenant_id: impl Into<String>,
        payload_ref: impl Into<String>,
        caption: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            payload_ref: payload_ref.into(),
            caption: caption.into(),
            used_count: 0,
            last_used_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn with_used_count(mut self, used_count: u32) -> Self {
        self.used_count = used_count;
        self
    }

    /// Rotation sort key: least used first, then oldest first, then id for stability
    pub fn rotation_key(&self) -> (u32, DateTime<Utc>, &str) {
        (self.used_count, self.created_at, self.id.as_str())
    }
}

// ============================================================================
// Slot Execution Record
// ============================================================================

/// Lifecycle of a claimed slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Running,
    Completed,
    Failed,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Terminal states can no longer transition
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown slot status '{other}'")),
        }
    }
}

/// Idempotency marker for one slot key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotExecutionRecord {
    pub slot_key: String,
    pub status: SlotStatus,
    pub tenant_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_summary: Option<String>,
}

impl SlotExecutionRecord {
    /// A freshly claimed record
    pub fn running(slot_key: impl Into<String>, tenant_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            slot_key: slot_key.into(),
            status: SlotStatus::Running,
            tenant_id: tenant_id.into(),
            started_at: at,
            completed_at: None,
            result_summary: None,
        }
    }
}

// ============================================================================
// Lock Record
// ============================================================================

/// Per-tenant, per-period execution right
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// `tenant_id + date + period`
    pub lock_id: String,
    pub tenant_id: String,

    /// Invocation id of the holder
    pub holder: String,

    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl LockRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// ============================================================================
// Outcome taxonomy
// ============================================================================

/// Failure classification surfaced to callers and the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Payload could not be fetched
    #[serde(rename = "ERR_DOWNLOAD")]
    Download,

    /// External publishing API rejected or failed the request
    #[serde(rename = "ERR_PUBLISH")]
    Publish,

    /// Invocation deadline expired before the slot could be finished
    #[serde(rename = "ERR_TIMEOUT")]
    Timeout,

    /// Anything unexpected
    #[serde(rename = "ERR_UNKNOWN")]
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "ERR_DOWNLOAD",
            Self::Publish => "ERR_PUBLISH",
            Self::Timeout => "ERR_TIMEOUT",
            Self::Unknown => "ERR_UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ERR_DOWNLOAD" => Ok(Self::Download),
            "ERR_PUBLISH" => Ok(Self::Publish),
            "ERR_TIMEOUT" => Ok(Self::Timeout),
            "ERR_UNKNOWN" => Ok(Self::Unknown),
            other => Err(format!("unknown error kind '{other}'")),
        }
    }
}

/// Benign reasons an invocation did not publish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    OutsideWindow,
    AlreadyExecuted,
    Locked,
    NoContent,
    NoCredentials,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::OutsideWindow => "outside_window",
            Self::AlreadyExecuted => "already_executed",
            Self::Locked => "locked",
            Self::NoContent => "no_content",
            Self::NoCredentials => "no_credentials",
        }
    }

    /// Human readable explanation returned to trigger callers
    pub fn message(&self) -> &'static str {
        match self {
            Self::Disabled => "System is disabled (kill switch off)",
            Self::OutsideWindow => "Outside the publishing window",
            Self::AlreadyExecuted => "Slot already processed",
            Self::Locked => "Tenant already holds an execution lock for this period",
            Self::NoContent => "No content available for tenant",
            Self::NoCredentials => "No publishing credential configured for tenant",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Posting Outcome
// ============================================================================

/// Append-only audit entry for one publish attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingOutcome {
    pub id: String,
    pub slot_key: String,
    pub tenant_id: String,
    pub content_id: String,
    pub success: bool,
    pub external_post_id: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl PostingOutcome {
    pub fn succeeded(
        slot_key: &str,
        tenant_id: &str,
        content_id: &str,
        external_post_id: impl Into<String>,
        duration_ms: u64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            slot_key: slot_key.to_string(),
            tenant_id: tenant_id.to_string(),
            content_id: content_id.to_string(),
            success: true,
            external_post_id: Some(external_post_id.into()),
            error_kind: None,
            error_message: None,
            duration_ms,
            created_at: at,
        }
    }

    pub fn failed(
        slot_key: &str,
        tenant_id: &str,
        content_id: &str,
        kind: ErrorKind,
        message: impl Into<String>,
        duration_ms: u64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            slot_key: slot_key.to_string(),
            tenant_id: tenant_id.to_string(),
            content_id: content_id.to_string(),
            success: false,
            external_post_id: None,
            error_kind: Some(kind),
            error_message: Some(message.into()),
            duration_ms,
            created_at: at,
        }
    }
}
