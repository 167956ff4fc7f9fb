//! Day plan: every slot of one day's window
//!
//! Produced by [`SlotScheduler::day_plan`](super::SlotScheduler::day_plan) for
//! the admin surface. The orchestrator itself never needs a plan; it maps the
//! current instant directly.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use super::slot::Slot;

/// Complete slot listing for a single local date
#[derive(Debug, Clone, Serialize)]
pub struct DayPlan {
    /// Local date this plan is for
    pub date: NaiveDate,

    /// Offset the slot times are expressed in
    pub utc_offset_minutes: i32,

    /// Slots in window order
    pub slots: Vec<Slot>,
}

impl DayPlan {
    pub fn new(date: NaiveDate, utc_offset_minutes: i32, slots: Vec<Slot>) -> Self {
        Self {
            date,
            utc_offset_minutes,
            slots,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Look up a slot by its key
    pub fn slot_by_key(&self, slot_key: &str) -> Option<&Slot> {
        self.slots.iter().find(|s| s.slot_key == slot_key)
    }

    /// All slots owned by one tenant
    pub fn slots_for_tenant(&self, tenant_id: &str) -> Vec<&Slot> {
        self.slots.iter().filter(|s| s.tenant_id == tenant_id).collect()
    }

    /// Plan as a table for the CLI
    pub fn display(&self) -> String {
        let mut output = format!("Plan for {} ({})\n", self.date, self.date.weekday());
        output.push_str(&format!("{:=<52}\n", ""));
        output.push_str(&format!(
            "{:>5} | {:^13} | {:^15} | {}\n",
            "Slot", "Time", "Key", "Tenant"
        ));
        output.push_str(&format!("{:-<52}\n", ""));

        for slot in &self.slots {
            output.push_str(&format!(
                "{:>5} | {} - {} | {} | {}\n",
                slot.slot_index,
                slot.starts_at.format("%H:%M"),
                slot.ends_at.format("%H:%M"),
                slot.slot_key,
                slot.tenant_id
            ));
        }

        output
    }
}
