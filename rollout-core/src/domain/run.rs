//! Pipeline runs
//!
//! A run is one execution of a pipeline for one trigger. It is created
//! `Queued`, claimed by a runner and finished with a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::artifact::ArtifactId;
use crate::error::ConfigurationError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub status: RunStatus,
    pub trigger: Trigger,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub runner_id: Option<String>,
    /// Set when a cancel was requested while the run was executing
    pub cancel_requested: bool,
    pub result: Option<RunResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// What caused a run: the pushed commit and who pushed it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub commit: String,
    pub branch: String,
    pub actor: String,
}

impl Trigger {
    /// Variables exposed to the definition's `env` module and to actions
    pub fn variables(&self) -> HashMap<String, String> {
        HashMap::from([
            ("COMMIT".to_string(), self.commit.clone()),
            ("BRANCH".to_string(), self.branch.clone()),
            ("ACTOR".to_string(), self.actor.clone()),
        ])
    }

    /// Content address of whatever this trigger builds
    pub fn artifact_id(&self) -> Result<ArtifactId, ConfigurationError> {
        ArtifactId::parse(self.commit.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub success: bool,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_variables() {
        let trigger = Trigger {
            commit: "abc123".to_string(),
            branch: "main".to_string(),
            actor: "dana".to_string(),
        };
        let vars = trigger.variables();
        assert_eq!(vars["COMMIT"], "abc123");
        assert_eq!(vars["BRANCH"], "main");
        assert_eq!(vars["ACTOR"], "dana");
        assert_eq!(trigger.artifact_id().unwrap().as_str(), "abc123");
    }

    #[test]
    fn test_branch_name_is_not_an_artifact_id() {
        let trigger = Trigger {
            commit: "refs/heads/main".to_string(),
            branch: "main".to_string(),
            actor: "dana".to_string(),
        };
        assert!(trigger.artifact_id().is_err());
    }

    #[test]
    fn test_terminal_run_statuses() {
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }
}
