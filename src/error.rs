//! Unified error handling for the slotcast crate
//!
//! Domain modules keep their own error enums; this module folds them into a
//! single [`Error`] for code that crosses module boundaries (CLI, server
//! startup, configuration loading).
//!
//! # Architecture
//!
//! - [`SlotcastErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust
//! use slotcast::error::{Error, ErrorCategory, SlotcastErrorTrait};
//!
//! let err = Error::config("window_end_hour must be greater than window_start_hour");
//! assert_eq!(err.category(), ErrorCategory::Config);
//! assert!(!err.is_recoverable());
//! ```

use thiserror::Error;

pub use crate::publisher::PublishError;
pub use crate::scheduler::error::SchedulerError;
pub use crate::storage::StoreError;

/// Common trait for all slotcast error types
pub trait SlotcastErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Publishing API and payload download errors
    Network,
    /// Repository errors
    Storage,
    /// Configuration and validation errors
    Config,
    /// Schedule configuration errors
    Scheduler,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the slotcast crate
#[derive(Error, Debug)]
pub enum Error {
    /// Schedule configuration errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Repository errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Publishing and payload download errors
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Validation and startup failures reported through `anyhow`
    #[error("{0}")]
    Other(String),
}

impl SlotcastErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            Self::Publish(e) => e.is_recoverable(),
            Self::Config(_) | Self::Other(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Store(_) => ErrorCategory::Storage,
            Self::Publish(_) => ErrorCategory::Network,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other(_) => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
