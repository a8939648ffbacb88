//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between repositories and contain domain logic.

pub mod deployment;
pub mod log;
pub mod pipeline;
pub mod run;

pub use deployment as deployment_service;
pub use log as log_service;
pub use pipeline as pipeline_service;
pub use run as run_service;
