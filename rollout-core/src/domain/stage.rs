//! Stage execution results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a stage within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Succeeded | StageStatus::Failed | StageStatus::Skipped
        )
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageStatus::Pending => "Pending",
            StageStatus::Running => "Running",
            StageStatus::Succeeded => "Succeeded",
            StageStatus::Failed => "Failed",
            StageStatus::Skipped => "Skipped",
        };
        f.write_str(s)
    }
}

/// Why a stage did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageErrorKind {
    /// An action exited unsuccessfully or could not be spawned
    ActionFailure,
    /// The stage exceeded its timeout
    Timeout,
    /// The deploy block failed (publish, remote update, health, rollback)
    Deployment,
    /// The run was cancelled before the stage started
    Cancelled,
    /// An upstream stage failed
    UpstreamFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    pub kind: StageErrorKind,
    pub message: String,
}

impl StageError {
    pub fn new(kind: StageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Finalized outcome of one stage
///
/// Only built through the constructors below once the stage is done, and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: String,
    pub status: StageStatus,
    /// Combined stdout and stderr of every executed action
    pub output: String,
    pub exit_code: Option<i32>,
    pub error: Option<StageError>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
}

impl StageResult {
    pub fn succeeded(
        stage: impl Into<String>,
        output: String,
        exit_code: Option<i32>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Succeeded,
            output,
            exit_code,
            error: None,
            started_at: Some(started_at),
            finished_at: Utc::now(),
        }
    }

    pub fn failed(
        stage: impl Into<String>,
        output: String,
        exit_code: Option<i32>,
        error: StageError,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Failed,
            output,
            exit_code,
            error: Some(error),
            started_at: Some(started_at),
            finished_at: Utc::now(),
        }
    }

    /// A stage that never started
    pub fn skipped(stage: impl Into<String>, error: StageError) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Skipped,
            output: String::new(),
            exit_code: None,
            error: Some(error),
            started_at: None,
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Succeeded
    }

    pub fn error_kind(&self) -> Option<StageErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!StageStatus::Pending.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
        assert!(StageStatus::Succeeded.is_terminal());
        assert!(StageStatus::Failed.is_terminal());
        assert!(StageStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_skipped_result_has_no_start() {
        let result = StageResult::skipped(
            "deploy",
            StageError::new(StageErrorKind::UpstreamFailed, "test failed"),
        );
        assert_eq!(result.status, StageStatus::Skipped);
        assert!(result.started_at.is_none());
        assert_eq!(result.error_kind(), Some(StageErrorKind::UpstreamFailed));
        assert!(!result.is_success());
    }

    #[test]
    fn test_failed_result_keeps_exit_code() {
        let started = Utc::now();
        let result = StageResult::failed(
            "test",
            "assertion failed".to_string(),
            Some(101),
            StageError::new(StageErrorKind::ActionFailure, "cargo test exited with 101"),
            started,
        );
        assert_eq!(result.exit_code, Some(101));
        assert!(result.finished_at >= started);
    }
}
