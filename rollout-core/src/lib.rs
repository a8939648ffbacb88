//! Rollout Core
//!
//! Core types and abstractions for the Rollout deployment orchestrator.
//!
//! This crate contains:
//! - Domain types: pipeline specs, execution plans, stage results, artifacts,
//!   deployment records and runs
//! - DTOs: Data transfer objects for inter-service communication
//! - Configuration errors raised while validating a pipeline

pub mod domain;
pub mod dto;
pub mod error;
