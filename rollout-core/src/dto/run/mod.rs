//! Run DTOs for inter-service communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pipeline::PipelineConfig;
use crate::domain::run::{RunResult, RunStatus, Trigger};

/// Request to queue a run of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRun {
    pub pipeline_id: Uuid,
    pub trigger: Trigger,
    /// Cancel in-flight runs of the same pipeline and branch
    #[serde(default)]
    pub supersede: bool,
}

/// Source-control push notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    /// Pushed ref, either `refs/heads/<branch>` or a bare branch name
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// Commit SHA after the push
    pub after: String,
    #[serde(default)]
    pub pusher: Option<PushActor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushActor {
    pub name: String,
}

impl PushEvent {
    /// Converts the push into a run trigger
    pub fn into_trigger(self) -> Trigger {
        let branch = self
            .git_ref
            .strip_prefix("refs/heads/")
            .unwrap_or(&self.git_ref)
            .to_string();
        Trigger {
            commit: self.after,
            branch,
            actor: self
                .pusher
                .map(|p| p.name)
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

/// Runner request to claim a queued run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRun {
    pub runner_id: String,
}

/// Everything a runner needs to execute a claimed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunExecutionInfo {
    pub run_id: Uuid,
    pub pipeline_id: Uuid,
    pub pipeline_name: String,
    pub pipeline_source: String,
    pub config: PipelineConfig,
    pub trigger: Trigger,
}

/// Terminal status reported by the runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRun {
    pub status: RunStatus,
    pub result: Option<RunResult>,
}

/// Control flags polled by the runner while a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunControl {
    pub cancel_requested: bool,
}
