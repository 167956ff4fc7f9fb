//! HTTP surface
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Purpose |
//! |---|---|---|---|
//! | POST | `/api/trigger` | bearer | Run one invocation for the current slot |
//! | GET | `/api/trigger` | - | Usage info and the current slot |
//! | GET | `/api/health` | - | Version and uptime |
//! | GET | `/api/settings/status` | - | Kill switch state |
//! | POST | `/api/settings/toggle` | bearer | Set the kill switch |
//! | GET | `/api/schedule/today` | - | Today's day plan |
//! | GET | `/api/schedule/{YYYY-MM-DD}` | - | Day plan for a date |
//! | GET | `/api/stock?days=N` | - | Unused content per tenant vs target |
//! | GET | `/api/runs?limit=N` | - | Recent slot records |
//! | GET | `/api/outcomes?limit=N` | - | Recent posting outcomes |
//! | POST | `/api/admin/sweep` | bearer | Close stale records, prune locks |
//! | GET | `/metrics` | - | Prometheus text |
//!
//! Bearer auth is enforced only when `server.api_secret` is set.

pub mod api;
pub mod config;
#[allow(clippy::module_inception)]
pub mod server;

pub use api::{create_router, ApiResponse, ErrorResponse};
pub use config::{ConfigError, ServerConfig, ServerConfigBuilder};
pub use server::{AppState, ServerError, ServerInfo, SlotcastServer};
