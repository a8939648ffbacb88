//! Core domain types
//!
//! This module contains the core domain structures used across Rollout services.
//! These types are shared between the orchestrator (persistence), the runner
//! (execution) and the CLI (display).

pub mod artifact;
pub mod deployment;
pub mod log;
pub mod pipeline;
pub mod plan;
pub mod run;
pub mod stage;
