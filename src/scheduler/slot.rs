//! Deterministic wall-clock to slot mapping
//!
//! The publishing window `[window_start_hour, window_end_hour)` is cut into
//! fixed-length slots counted from the window start. Slot `n` belongs to
//! roster entry `n mod roster.len()`, so the tenants take turns in roster
//! order and the same instant always maps to the same slot:
//!
//! ```text
//! 05:00      05:06      05:12            05:54      06:00
//!   │  FP_1    │  FP_2    │  FP_3   ...    │  FP_10   │  FP_1  ...
//!   └ 20240115-05-00      └ 20240115-05-12            └ 20240115-06-00
//! ```

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::error::{SchedulerError, SchedulerResult};
use super::plan::DayPlan;

// ============================================================================
// Schedule Configuration
// ============================================================================

/// Publishing window configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// First hour of the window (inclusive, local time)
    pub window_start_hour: u32,

    /// Hour the window closes (exclusive, local time)
    pub window_end_hour: u32,

    /// Length of each slot in minutes
    pub slot_length_minutes: u32,

    /// Offset of the local timezone from UTC in minutes (420 = UTC+7)
    pub utc_offset_minutes: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            window_start_hour: 5,
            window_end_hour: 22,
            slot_length_minutes: 6,
            utc_offset_minutes: 420,
        }
    }
}

impl ScheduleConfig {
    /// Create a new config builder
    pub fn builder() -> ScheduleConfigBuilder {
        ScheduleConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.window_start_hour >= self.window_end_hour || self.window_end_hour > 24 {
            return Err(SchedulerError::invalid_window(
                self.window_start_hour,
                self.window_end_hour,
            ));
        }

        if self.slot_length_minutes == 0 {
            return Err(SchedulerError::invalid_slot_length(0, "must be positive"));
        }

        if self.slot_length_minutes > self.window_minutes() {
            return Err(SchedulerError::invalid_slot_length(
                self.slot_length_minutes,
                format!("longer than the {}-minute window", self.window_minutes()),
            ));
        }

        self.offset()?;
        Ok(())
    }

    /// Window length in minutes
    pub fn window_minutes(&self) -> u32 {
        self.window_end_hour.saturating_sub(self.window_start_hour) * 60
    }

    /// Number of slots in one day's window; a trailing partial slot counts
    pub fn slots_per_day(&self) -> u32 {
        if self.slot_length_minutes == 0 {
            return 0;
        }
        self.window_minutes().div_ceil(self.slot_length_minutes)
    }

    /// Local timezone as a fixed offset
    pub fn offset(&self) -> SchedulerResult<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(SchedulerError::InvalidOffset {
                minutes: self.utc_offset_minutes,
            })
    }
}

/// Builder for ScheduleConfig
#[derive(Debug, Default)]
pub struct ScheduleConfigBuilder {
    window_start_hour: Option<u32>,
    window_end_hour: Option<u32>,
    slot_length_minutes: Option<u32>,
    utc_offset_minutes: Option<i32>,
}

impl ScheduleConfigBuilder {
    /// Set the window bounds
    pub fn window(mut self, start_hour: u32, end_hour: u32) -> Self {
        self.window_start_hour = Some(start_hour);
        self.window_end_hour = Some(end_hour);
        self
    }

    /// Set the slot length
    pub fn slot_length_minutes(mut self, minutes: u32) -> Self {
        self.slot_length_minutes = Some(minutes);
        self
    }

    /// Set the UTC offset
    pub fn utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = Some(minutes);
        self
    }

    /// Build the config
    pub fn build(self) -> SchedulerResult<ScheduleConfig> {
        let defaults = ScheduleConfig::default();
        let config = ScheduleConfig {
            window_start_hour: self.window_start_hour.unwrap_or(defaults.window_start_hour),
            window_end_hour: self.window_end_hour.unwrap_or(defaults.window_end_hour),
            slot_length_minutes: self
                .slot_length_minutes
                .unwrap_or(defaults.slot_length_minutes),
            utc_offset_minutes: self.utc_offset_minutes.unwrap_or(defaults.utc_offset_minutes),
        };
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Slot
// ============================================================================

/// One tenant turn inside the window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    /// `YYYYMMDD-HH-mm` of the slot start in local time
    pub slot_key: String,

    /// Local calendar date
    pub date: NaiveDate,

    /// Position of the slot inside the day's window
    pub slot_index: u32,

    /// Position of the owning tenant in the roster
    pub tenant_index: usize,

    pub tenant_id: String,

    /// Rotation cycle of the day; each tenant gets exactly one slot per cycle
    pub cycle: u32,

    pub starts_at: DateTime<FixedOffset>,
    pub ends_at: DateTime<FixedOffset>,
}

impl Slot {
    /// Period component of the tenant lock id
    pub fn lock_period(&self) -> String {
        format!("{}-c{:02}", self.date.format("%Y%m%d"), self.cycle)
    }

    /// Whether `now` falls inside this slot
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        now >= self.starts_at && now < self.ends_at
    }
}

// ============================================================================
// Slot Scheduler
// ============================================================================

/// Pure mapping from wall-clock time to the slot and tenant whose turn it is
#[derive(Debug, Clone)]
pub struct SlotScheduler {
    config: ScheduleConfig,
    roster: Vec<String>,
    offset: FixedOffset,
}

impl SlotScheduler {
    /// Create a scheduler over a validated window and roster
    pub fn new(config: ScheduleConfig, roster: Vec<String>) -> SchedulerResult<Self> {
        config.validate()?;
        validate_roster(&roster)?;
        let offset = config.offset()?;

        Ok(Self {
            config,
            roster,
            offset,
        })
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Local date for an instant
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// Minutes of one full rotation through the roster
    pub fn cycle_length_minutes(&self) -> u32 {
        self.config.slot_length_minutes * self.roster.len() as u32
    }

    /// Slots each tenant receives per day (upper bound when the roster does not divide evenly)
    pub fn slots_per_tenant_per_day(&self) -> u32 {
        self.config.slots_per_day().div_ceil(self.roster.len() as u32)
    }

    /// Slot active at `now`, or `None` outside the window
    pub fn slot_at(&self, now: DateTime<Utc>) -> Option<Slot> {
        let local = now.with_timezone(&self.offset).naive_local();
        self.slot_for_local(local)
    }

    /// Slot active at a local wall-clock time, or `None` outside the window
    pub fn slot_for_local(&self, local: NaiveDateTime) -> Option<Slot> {
        let hour = local.hour();
        if hour < self.config.window_start_hour || hour >= self.config.window_end_hour {
            return None;
        }

        let minutes_since_start = (hour - self.config.window_start_hour) * 60 + local.minute();
        let slot_index = minutes_since_start / self.config.slot_length_minutes;
        self.build_slot(local.date(), slot_index)
    }

    /// Full-day listing of every slot in the window
    pub fn day_plan(&self, date: NaiveDate) -> DayPlan {
        let slots = (0..self.config.slots_per_day())
            .filter_map(|index| self.build_slot(date, index))
            .collect();
        DayPlan::new(date, self.config.utc_offset_minutes, slots)
    }

    /// Next slot owned by `tenant_id` that starts at or after `after`, looking at most one day ahead
    pub fn next_slot_for_tenant(&self, tenant_id: &str, after: DateTime<Utc>) -> Option<Slot> {
        let today = self.local_date(after);
        let tomorrow = today.succ_opt()?;

        [today, tomorrow]
            .into_iter()
            .flat_map(|date| self.day_plan(date).slots)
            .find(|slot| slot.tenant_id == tenant_id && slot.starts_at >= after)
    }

    fn build_slot(&self, date: NaiveDate, slot_index: u32) -> Option<Slot> {
        if slot_index >= self.config.slots_per_day() {
            return None;
        }

        let tenant_index = slot_index as usize % self.roster.len();
        let cycle = slot_index / self.roster.len() as u32;

        let start_minute = self.config.window_start_hour * 60 + slot_index * self.config.slot_length_minutes;
        let end_minute = (start_minute + self.config.slot_length_minutes)
            .min(self.config.window_end_hour * 60);

        let midnight = date.and_time(NaiveTime::MIN);
        let starts_naive = midnight + Duration::minutes(i64::from(start_minute));
        let ends_naive = midnight + Duration::minutes(i64::from(end_minute));

        let starts_at = self.offset.from_local_datetime(&starts_naive).single()?;
        let ends_at = self.offset.from_local_datetime(&ends_naive).single()?;

        Some(Slot {
            slot_key: starts_naive.format("%Y%m%d-%H-%M").to_string(),
            date,
            slot_index,
            tenant_index,
            tenant_id: self.roster[tenant_index].clone(),
            cycle,
            starts_at,
            ends_at,
        })
    }
}

fn validate_roster(roster: &[String]) -> SchedulerResult<()> {
    if roster.is_empty() {
        return Err(SchedulerError::EmptyRoster);
    }

    let mut seen = HashSet::with_capacity(roster.len());
    for id in roster {
        if !seen.insert(id.as_str()) {
            return Err(SchedulerError::DuplicateTenant { id: id.clone() });
        }
    }

    Ok(())
}

/// Default ten-page roster `FP_1`..`FP_10`
pub fn default_roster() -> Vec<String> {
    (1..=10).map(|n| format!("FP_{n}")).collect()
}

// ============================================================================
// Tests
// ============================================================================
