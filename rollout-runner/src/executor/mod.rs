//! Stage execution
//!
//! Actions are opaque units with a typed outcome. The stage executor runs
//! a stage's actions in order under its timeout, then hands deploy stages
//! to the deployment controller.

mod process;
mod stage;

pub use process::ProcessAction;
pub use stage::StandardStageExecutor;

use async_trait::async_trait;

use crate::context::RunContext;

/// Result of running one action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub success: bool,
    /// Exit status, `None` when the action never produced one
    pub exit_code: Option<i32>,
    /// Stdout and stderr merged line by line in arrival order
    pub output: String,
}

impl ActionOutcome {
    /// An action that could not be started at all
    pub fn not_started(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: None,
            output: reason.into(),
        }
    }
}

/// One unit of stage work
#[async_trait]
pub trait Action: Send + Sync {
    /// Short label used in logs and failure messages
    fn describe(&self) -> String;

    async fn execute(&self, ctx: &RunContext) -> ActionOutcome;
}
