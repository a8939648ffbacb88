//! Run notification payload
//!
//! Posted once per run to the configured webhook. The `text` field makes the
//! payload directly usable as a chat incoming-webhook body.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub status: NotificationStatus,
    pub pipeline: String,
    pub run_id: Uuid,
    pub artifact_id: Option<String>,
    pub actor: String,
    pub branch: String,
    /// Failure reason, `cancelled` for cancelled runs
    pub detail: Option<String>,
    pub text: String,
}

impl NotificationPayload {
    pub fn new(
        status: NotificationStatus,
        pipeline: impl Into<String>,
        run_id: Uuid,
        artifact_id: Option<String>,
        actor: impl Into<String>,
        branch: impl Into<String>,
        detail: Option<String>,
    ) -> Self {
        let pipeline = pipeline.into();
        let actor = actor.into();
        let branch = branch.into();

        let verdict = match status {
            NotificationStatus::Succeeded => "succeeded",
            NotificationStatus::Failed => "failed",
        };
        let mut text = format!(
            "Pipeline {} {} on {} ({}) by {}",
            pipeline,
            verdict,
            branch,
            artifact_id.as_deref().unwrap_or("no artifact"),
            actor
        );
        if let Some(detail) = &detail {
            text.push_str(": ");
            text.push_str(detail);
        }

        Self {
            status,
            pipeline,
            run_id,
            artifact_id,
            actor,
            branch,
            detail,
            text,
        }
    }
}
