//! Scheduler layer for the runner
//!
//! `poller` claims queued runs and drives their lifecycle against the
//! orchestrator; `dag` executes one run's stages in dependency order.

pub mod dag;
pub mod poller;

pub use dag::{DependencyScheduler, RunReport, StageOutcome, StageReporter, StageRunner};
pub use poller::RunPoller;

#[cfg(test)]
pub(crate) use dag::testing;
