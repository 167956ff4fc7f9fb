//! Persistence for slot records, locks, content, tenants, settings and outcomes
//!
//! The orchestrator depends only on the repository traits in [`repository`].
//! Two backends are provided:
//!
//! - [`SqliteStore`] - durable, shared by every process pointing at the same file
//! - [`MemoryStore`] - process-local, used by tests and dry runs

pub mod error;
pub mod memory;
pub mod repository;
pub mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use repository::{
    ContentRepository, LockRepository, OutcomeRepository, SettingsRepository,
    SlotRecordRepository, Storage, TenantRepository,
};
pub use sqlite::SqliteStore;
