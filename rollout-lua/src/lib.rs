//! Rollout Lua Infrastructure
//!
//! Pipeline definitions are Lua chunks evaluated in a restricted sandbox.
//! This crate provides:
//! - the sandbox and its `pipeline` helper module
//! - the module trait, registry and LuaLS stub generation
//! - the `env` module over trigger and pipeline variables
//! - the parser turning a definition into a validated execution plan

pub mod module;
pub mod modules;
pub mod parser;
pub mod sandbox;

pub use module::{ModuleRegistry, RolloutModule};
pub use modules::{EnvModule, NoVars, TriggerVars, VarProvider};
pub use parser::{LoadedPipeline, load_pipeline, parse_pipeline_spec, parse_pipeline_spec_with};
pub use sandbox::{PIPELINE_STUBS, create_sandbox};
