//! Pipeline domain types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::deployment::DeploySpec;
use crate::domain::plan::ExecutionPlan;
use crate::error::ConfigurationError;

/// Stored pipeline definition
///
/// Structure shared between orchestrator (persists) and runner (executes).
/// The `script` is the Lua source that evaluates to a [`PipelineSpec`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub script: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub tags: Vec<String>,
    pub config: PipelineConfig,
}

/// Pipeline configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on stages executing at the same time within one run
    pub max_parallel_stages: usize,
    /// Default per-stage timeout, overridden by a stage's own timeout
    pub stage_timeout_seconds: Option<u64>,
    /// Variables exported to every action and to the definition's `env` module
    pub env_vars: HashMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_parallel_stages: 4,
            stage_timeout_seconds: Some(1800),
            env_vars: HashMap::new(),
        }
    }
}

/// Evaluated pipeline definition
///
/// Produced by the definition loader; it is plain data and can be sent
/// between tasks freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    pub description: Option<String>,
    pub stages: Vec<StageSpec>,
}

impl PipelineSpec {
    /// Looks up a stage by name
    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Validates the stage graph and computes its execution plan
    ///
    /// Fails with a [`ConfigurationError`] for duplicate names, unknown or
    /// self dependencies, empty stages and dependency cycles.
    pub fn plan(&self) -> Result<ExecutionPlan, ConfigurationError> {
        ExecutionPlan::build(self)
    }

    /// Stages carrying a deploy block, in declaration order
    pub fn deploy_stages(&self) -> impl Iterator<Item = &StageSpec> {
        self.stages.iter().filter(|s| s.deploy.is_some())
    }
}

/// A named unit of pipeline work with explicit dependencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: String,
    #[serde(default)]
    pub needs: Vec<String>,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    /// Stage timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub deploy: Option<DeploySpec>,
}

impl StageSpec {
    /// Creates a stage with no dependencies, actions or deploy block
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            needs: Vec::new(),
            actions: Vec::new(),
            timeout_ms: None,
            deploy: None,
        }
    }

    /// Adds an upstream dependency
    pub fn needs(mut self, stage: impl Into<String>) -> Self {
        self.needs.push(stage.into());
        self
    }

    /// Appends an action
    pub fn action(mut self, action: ActionSpec) -> Self {
        self.actions.push(action);
        self
    }
}

/// One step within a stage
///
/// Actions are executed as opaque units with a boolean success contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionSpec {
    /// Run a program directly with explicit arguments
    Command {
        cmd: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        cwd: Option<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Run a script through `sh -c`
    Shell { script: String },
}

impl ActionSpec {
    /// Shorthand for a shell action
    pub fn shell(script: impl Into<String>) -> Self {
        ActionSpec::Shell {
            script: script.into(),
        }
    }

    /// Short human readable description used in logs
    pub fn describe(&self) -> String {
        match self {
            ActionSpec::Command { cmd, args, .. } if args.is_empty() => cmd.clone(),
            ActionSpec::Command { cmd, args, .. } => format!("{} {}", cmd, args.join(" ")),
            ActionSpec::Shell { script } => script.lines().next().unwrap_or_default().to_string(),
        }
    }
}
