//! Configuration errors
//!
//! Raised while turning a pipeline definition into an execution plan.
//! A configuration error is fatal: the pipeline never starts.

use thiserror::Error;

/// A malformed or cyclic pipeline definition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("pipeline '{0}' has no stages")]
    EmptyPipeline(String),

    #[error("stage name cannot be empty")]
    EmptyStageName,

    #[error("stage '{0}' is declared more than once")]
    DuplicateStage(String),

    #[error("stage '{stage}' needs unknown stage '{dependency}'")]
    UnknownDependency { stage: String, dependency: String },

    #[error("stage '{0}' depends on itself")]
    SelfDependency(String),

    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    #[error("stage '{0}' has neither actions nor a deploy block")]
    EmptyStage(String),

    #[error("stage '{stage}' has an invalid deploy block: {reason}")]
    InvalidDeploy { stage: String, reason: String },

    #[error("invalid artifact id '{0}'")]
    InvalidArtifactId(String),
}
