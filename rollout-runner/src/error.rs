//! Runner error taxonomy
//!
//! [`RunError`] covers why a stage or run failed. [`DeployError`] covers
//! the deployment controller; it surfaces through [`RunError::Deploy`].

use std::time::Duration;

use rollout_core::domain::deployment::DeployPhase;
use rollout_core::domain::stage::StageErrorKind;
use rollout_core::error::ConfigurationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    /// The definition could not be loaded or planned; nothing ran
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("action failed: {0}")]
    ActionFailure(String),

    #[error("stage timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error(transparent)]
    Deploy(#[from] DeployError),
}

impl RunError {
    /// Kind recorded on the failed stage's result
    pub fn stage_error_kind(&self) -> StageErrorKind {
        match self {
            RunError::Configuration(_) | RunError::ActionFailure(_) => {
                StageErrorKind::ActionFailure
            }
            RunError::Timeout(_) => StageErrorKind::Timeout,
            RunError::Deploy(_) => StageErrorKind::Deployment,
        }
    }
}

impl From<ConfigurationError> for RunError {
    fn from(err: ConfigurationError) -> Self {
        RunError::Configuration(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    /// Registry push failed; the remote host was never touched
    #[error("failed to publish {artifact}: {message}")]
    Publish { artifact: String, message: String },

    #[error("remote update failed: {0}")]
    RemoteUpdate(String),

    #[error("health check failed after {attempts} attempt(s): {last_error}")]
    HealthCheck { attempts: u32, last_error: String },

    /// The new artifact failed and the previous one was restored
    #[error("deployment of {failed} failed, rolled back to {restored}: {reason}")]
    RolledBack {
        failed: String,
        restored: String,
        reason: String,
    },

    /// Rollback failed too; the environment needs an operator
    #[error("environment '{environment}' is inconsistent: {message}")]
    InconsistentState {
        environment: String,
        message: String,
    },

    #[error("illegal deploy transition {from} -> {to}")]
    IllegalTransition { from: DeployPhase, to: DeployPhase },

    #[error("deployment store error: {0}")]
    Store(String),
}

impl From<rollout_client::ClientError> for DeployError {
    fn from(err: rollout_client::ClientError) -> Self {
        DeployError::Store(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_kinds() {
        assert_eq!(
            RunError::Timeout(Duration::from_secs(3)).stage_error_kind(),
            StageErrorKind::Timeout
        );
        assert_eq!(
            RunError::from(DeployError::RemoteUpdate("ssh".into())).stage_error_kind(),
            StageErrorKind::Deployment
        );
        assert_eq!(
            RunError::ActionFailure("exit 1".into()).stage_error_kind(),
            StageErrorKind::ActionFailure
        );
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(
            RunError::Timeout(Duration::from_secs(90)).to_string(),
            "stage timed out after 90s"
        );
    }
}
