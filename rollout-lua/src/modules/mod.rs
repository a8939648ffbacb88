//! Modules available to pipeline definitions

pub mod env;

pub use env::{EnvModule, NoVars, TriggerVars, VarProvider};
