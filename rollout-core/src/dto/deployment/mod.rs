//! Deployment DTOs for inter-service communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::artifact::Artifact;
use crate::domain::deployment::{DeploymentOutcome, DeploymentRecord, current_artifact};

/// Derived "what is live" view of one environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentDeployment {
    pub environment: String,
    /// Live artifact; `None` if never deployed or inconsistent
    pub artifact: Option<Artifact>,
    /// Latest attempt left the environment in an unknown state
    pub inconsistent: bool,
    /// Record the pointer was derived from
    pub record_id: Option<Uuid>,
}

impl CurrentDeployment {
    /// Builds the view from an environment's history, oldest record first
    pub fn from_history(environment: impl Into<String>, history: &[DeploymentRecord]) -> Self {
        let latest = history.last();
        Self {
            environment: environment.into(),
            artifact: current_artifact(history).cloned(),
            inconsistent: latest
                .map(|r| r.outcome == DeploymentOutcome::Inconsistent)
                .unwrap_or(false),
            record_id: latest.map(|r| r.id),
        }
    }
}

/// Operator request that clears an inconsistent environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcknowledgeDeployment {
    /// Artifact verified to be running now; `None` if nothing is
    #[serde(default)]
    pub live: Option<Artifact>,
    #[serde(default)]
    pub note: Option<String>,
}
