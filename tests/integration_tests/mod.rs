//! End-to-end tests for the trigger pipeline

pub mod api_test;
pub mod concurrency_test;
pub mod recovery_test;
pub mod rotation_test;
pub mod trigger_test;
