//! Data Transfer Objects for inter-service communication
//!
//! This module contains DTOs exchanged between Rollout services
//! (orchestrator, runner, CLI) and with external webhooks.

pub mod deployment;
pub mod log;
pub mod notification;
pub mod pipeline;
pub mod run;
