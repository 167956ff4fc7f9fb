//! Slot scheduling
//!
//! Maps wall-clock time to "whose turn is it". Everything in this module is
//! pure: the same instant and configuration always produce the same slot,
//! which is what lets retried or duplicated triggers agree on a slot key.
//!
//! # Overview
//!
//! ```text
//!   now (UTC) ──► local time (fixed offset)
//!                     │
//!                     ├── outside [start, end) ──► None
//!                     │
//!                     └── slot_index = minutes_since_start / slot_length
//!                         tenant     = roster[slot_index mod roster.len()]
//!                         slot_key   = YYYYMMDD-HH-mm (slot start)
//! ```
//!
//! # Modules
//!
//! - [`slot`] - Window configuration, [`Slot`] and the [`SlotScheduler`]
//! - [`plan`] - Full-day slot listing for operators
//! - [`error`] - Configuration errors
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use slotcast::scheduler::{default_roster, ScheduleConfig, SlotScheduler};
//!
//! let scheduler = SlotScheduler::new(ScheduleConfig::default(), default_roster()).unwrap();
//! let at = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(5, 6, 0).unwrap();
//! let slot = scheduler.slot_for_local(at).unwrap();
//! assert_eq!(slot.tenant_id, "FP_2");
//! assert_eq!(slot.slot_key, "20240115-05-06");
//! ```

pub mod error;
pub mod plan;
pub mod slot;

pub use error::{SchedulerError, SchedulerResult};
pub use plan::DayPlan;
pub use slot::{default_roster, ScheduleConfig, ScheduleConfigBuilder, Slot, SlotScheduler};
