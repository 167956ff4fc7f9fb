//! slotcast - slot-based multi-tenant publishing orchestrator
//!
//! An external cron pings a trigger endpoint every few minutes. Each ping is
//! one short invocation that works out whose turn it is, makes sure nobody
//! else already handled that turn, picks the tenant's least-used content and
//! publishes it.
//!
//! # Architecture
//!
//! - [`scheduler`] - Pure mapping from wall-clock time to slot and tenant
//! - [`orchestrator`] - Kill switch, idempotency gate, tenant locks, content rotation, outcome recording
//! - [`storage`] - Repository traits with SQLite and in-memory backends
//! - [`publisher`] - Payload download and Graph API publishing
//! - [`server`] - axum HTTP surface (trigger, admin, schedule, metrics)
//! - [`config`] - TOML + environment configuration
//! - [`models`] - Core data structures
//! - [`metrics`] - Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use slotcast::config::Config;
//! use slotcast::orchestrator::{Dependencies, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let deps = Dependencies::from_config(&config)?;
//!     let orchestrator = Orchestrator::new(&config, deps)?;
//!     let result = orchestrator.trigger().await;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod publisher;
pub mod scheduler;
pub mod server;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::clock::{Clock, FixedClock, SharedClock, SystemClock};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result, SlotcastErrorTrait};
    pub use crate::models::{
        ContentItem, ErrorKind, PostingOutcome, SkipReason, SlotExecutionRecord, SlotStatus,
        Tenant,
    };
    pub use crate::orchestrator::{Dependencies, Orchestrator, TriggerResult};
    pub use crate::publisher::{PayloadFetcher, PostingClient, PublishError};
    pub use crate::scheduler::{Slot, SlotScheduler};
    pub use crate::storage::Storage;
}

pub use models::{ContentItem, ErrorKind, SkipReason, SlotStatus, Tenant};
