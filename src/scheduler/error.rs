//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Window bounds are not a valid `[start, end)` range within a day
    InvalidWindow {
        start_hour: u32,
        end_hour: u32,
    },

    /// Slot length is zero or longer than the window
    InvalidSlotLength {
        minutes: u32,
        reason: String,
    },

    /// UTC offset outside of what any timezone uses
    InvalidOffset {
        minutes: i32,
    },

    /// No tenants to rotate through
    EmptyRoster,

    /// Same tenant listed twice in the roster
    DuplicateTenant {
        id: String,
    },

    /// Unparseable date or time input
    InvalidDate {
        value: String,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidWindow {
                start_hour,
                end_hour,
            } => {
                write!(
                    f,
                    "Invalid publishing window [{}, {}). Start must be before end and end at most 24",
                    start_hour, end_hour
                )
            }
            Self::InvalidSlotLength { minutes, reason } => {
                write!(f, "Invalid slot length {} minutes: {}", minutes, reason)
            }
            Self::InvalidOffset { minutes } => {
                write!(f, "Invalid UTC offset: {} minutes", minutes)
            }
            Self::EmptyRoster => write!(f, "Roster must contain at least one tenant"),
            Self::DuplicateTenant { id } => {
                write!(f, "Tenant '{}' appears more than once in the roster", id)
            }
            Self::InvalidDate { value } => {
                write!(f, "Invalid date: {}", value)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create an invalid window error
    pub fn invalid_window(start_hour: u32, end_hour: u32) -> Self {
        Self::InvalidWindow {
            start_hour,
            end_hour,
        }
    }

    /// Create an invalid slot length error
    pub fn invalid_slot_length(minutes: u32, reason: impl Into<String>) -> Self {
        Self::InvalidSlotLength {
            minutes,
            reason: reason.into(),
        }
    }

    /// Create an invalid date error
    pub fn invalid_date(value: impl Into<String>) -> Self {
        Self::InvalidDate {
            value: value.into(),
        }
    }

    /// Scheduler errors are configuration mistakes, never transient
    pub fn is_recoverable(&self) -> bool {
        false
    }
}
