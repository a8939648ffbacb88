//! Service layer
//!
//! Turns a claimed run into a report: loads the definition, schedules its
//! stages and builds the notification for the outcome.

mod execution;

pub use execution::{ExecutionService, notification_for};
