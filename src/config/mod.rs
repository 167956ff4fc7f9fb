//! Configuration management for slotcast
//!
//! Configuration is read from a TOML file (every section optional) and then
//! overridden by `SLOTCAST_*` environment variables. `Config::from_env` is the
//! same as loading an empty file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::scheduler::{default_roster, ScheduleConfig, SlotScheduler};
use crate::server::config::ServerConfig;
use crate::utils::retry::RetryConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Publishing window and slot length
    pub schedule: ScheduleConfig,

    /// Ordered tenant ids; slot `n` belongs to `roster[n mod len]`
    pub roster: RosterConfig,

    /// Persistence
    pub storage: StorageConfig,

    /// External publishing API
    pub publisher: PublisherConfig,

    /// HTTP surface
    pub server: ServerConfig,

    /// Invocation deadline, lock lifetime and staleness policy
    pub orchestrator: OrchestratorConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Tenant rotation order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    pub tenants: Vec<String>,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            tenants: default_roster(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data/slotcast.db"),
        }
    }
}

/// Publishing client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Graph API base URL including version
    pub graph_url: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Prefix for payload refs that are bare file ids rather than URLs
    pub payload_base_url: String,

    /// Retries for transient failures inside one publish call
    pub max_retries: u32,

    /// Base backoff delay in milliseconds
    pub retry_base_delay_ms: u64,

    /// User agent string
    pub user_agent: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            graph_url: String::from("https://graph.facebook.com/v19.0"),
            request_timeout_secs: 30,
            payload_base_url: String::from("https://drive.google.com/uc?export=download&id="),
            max_retries: 2,
            retry_base_delay_ms: 500,
            user_agent: format!("slotcast/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl PublisherConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backoff policy for the HTTP clients
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::with_delays(
            self.max_retries,
            self.retry_base_delay_ms,
            self.retry_base_delay_ms.saturating_mul(8),
        )
    }
}

/// Orchestrator policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Hard wall-clock budget of one invocation
    pub invocation_deadline_secs: u64,

    /// Lock lifetime; 0 derives one rotation cycle from the schedule
    pub lock_ttl_minutes: u32,

    /// `running` records older than this are failed by the sweep
    pub stale_after_minutes: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            invocation_deadline_secs: 55,
            lock_ttl_minutes: 0,
            stale_after_minutes: 30,
        }
    }
}

impl OrchestratorConfig {
    #[must_use]
    pub fn invocation_deadline(&self) -> Duration {
        Duration::from_secs(self.invocation_deadline_secs)
    }

    /// Effective lock lifetime for a scheduler's rotation cycle
    pub fn lock_ttl(&self, scheduler: &SlotScheduler) -> chrono::Duration {
        let minutes = if self.lock_ttl_minutes == 0 {
            scheduler.cycle_length_minutes()
        } else {
            self.lock_ttl_minutes
        };
        chrono::Duration::minutes(i64::from(minutes))
    }

    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.stale_after_minutes))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

/// Parse an env var, falling back to `current` when unset or malformed
fn env_or<T: std::str::FromStr>(name: &str, current: T) -> T {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(var = name, value = %raw, "Ignoring malformed environment value");
                current
            }
        },
        Err(_) => current,
    }
}

impl Config {
    /// Load configuration from environment variables over the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        config.apply_env();
        Ok(config)
    }

    /// `from_file` when a path is given, `from_env` otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_env(),
        }
    }

    fn apply_env(&mut self) {
        let s = &mut self.schedule;
        s.window_start_hour = env_or("SLOTCAST_WINDOW_START_HOUR", s.window_start_hour);
        s.window_end_hour = env_or("SLOTCAST_WINDOW_END_HOUR", s.window_end_hour);
        s.slot_length_minutes = env_or("SLOTCAST_SLOT_LENGTH_MINUTES", s.slot_length_minutes);
        s.utc_offset_minutes = env_or("SLOTCAST_UTC_OFFSET_MINUTES", s.utc_offset_minutes);

        if let Ok(roster) = std::env::var("SLOTCAST_ROSTER") {
            self.roster.tenants = roster
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Ok(path) = std::env::var("SLOTCAST_SQLITE_PATH") {
            self.storage.sqlite_path = PathBuf::from(path);
        }

        let p = &mut self.publisher;
        if let Ok(url) = std::env::var("SLOTCAST_GRAPH_URL") {
            p.graph_url = url;
        }
        if let Ok(base) = std::env::var("SLOTCAST_PAYLOAD_BASE_URL") {
            p.payload_base_url = base;
        }
        p.request_timeout_secs = env_or("SLOTCAST_REQUEST_TIMEOUT", p.request_timeout_secs);
        p.max_retries = env_or("SLOTCAST_MAX_RETRIES", p.max_retries);

        let srv = &mut self.server;
        srv.bind_address = env_or("SLOTCAST_BIND_ADDRESS", srv.bind_address);
        if let Ok(secret) = std::env::var("SLOTCAST_API_SECRET").or_else(|_| std::env::var("CRON_SECRET")) {
            srv.api_secret = Some(secret);
        }

        let o = &mut self.orchestrator;
        o.invocation_deadline_secs = env_or("SLOTCAST_DEADLINE_SECS", o.invocation_deadline_secs);
        o.lock_ttl_minutes = env_or("SLOTCAST_LOCK_TTL_MINUTES", o.lock_ttl_minutes);
        o.stale_after_minutes = env_or("SLOTCAST_STALE_AFTER_MINUTES", o.stale_after_minutes);

        if let Ok(level) = std::env::var("SLOTCAST_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("SLOTCAST_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.schedule.validate().context("Invalid [schedule] section")?;

        SlotScheduler::new(self.schedule.clone(), self.roster.tenants.clone())
            .context("Invalid [roster] section")?;

        let graph_url = Url::parse(&self.publisher.graph_url)
            .with_context(|| format!("Invalid graph_url: {}", self.publisher.graph_url))?;
        if !matches!(graph_url.scheme(), "http" | "https") {
            anyhow::bail!("graph_url must use http or https");
        }

        Url::parse(&self.publisher.payload_base_url).with_context(|| {
            format!("Invalid payload_base_url: {}", self.publisher.payload_base_url)
        })?;

        if self.publisher.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }

        if self.orchestrator.invocation_deadline_secs == 0 {
            anyhow::bail!("invocation_deadline_secs must be greater than 0");
        }

        if self.orchestrator.stale_after_minutes == 0 {
            anyhow::bail!("stale_after_minutes must be greater than 0");
        }

        // A running slot must outlive its own invocation before the sweep may fail it
        let stale_after_secs = u64::from(self.orchestrator.stale_after_minutes) * 60;
        if stale_after_secs <= self.orchestrator.invocation_deadline_secs {
            anyhow::bail!(
                "stale_after_minutes ({}m) must exceed invocation_deadline_secs ({}s)",
                self.orchestrator.stale_after_minutes,
                self.orchestrator.invocation_deadline_secs
            );
        }

        self.server.validate().context("Invalid [server] section")?;

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        Ok(())
    }

    /// Build the scheduler described by `schedule` and `roster`
    pub fn scheduler(&self) -> Result<SlotScheduler> {
        Ok(SlotScheduler::new(
            self.schedule.clone(),
            self.roster.tenants.clone(),
        )?)
    }
}
