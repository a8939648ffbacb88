//! Standard stage executor
//!
//! Runs a stage's actions in declared order under the stage timeout and
//! stops at the first failing action. A deploy block runs afterwards,
//! outside the timeout, through the deployment controller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollout_core::domain::artifact::Artifact;
use rollout_core::domain::deployment::DeploySpec;
use rollout_core::domain::pipeline::StageSpec;
use rollout_core::domain::stage::{StageError, StageResult};
use tracing::{info, warn};

use super::{Action, ProcessAction};
use crate::context::RunContext;
use crate::deploy::DeploymentController;
use crate::error::RunError;
use crate::scheduler::{StageOutcome, StageRunner};

pub struct StandardStageExecutor {
    deployer: Arc<DeploymentController>,
    /// Applies to stages without their own timeout
    default_timeout: Duration,
}

/// Output and last exit status gathered while a stage runs
#[derive(Default)]
struct Progress {
    output: String,
    exit_code: Option<i32>,
}

impl StandardStageExecutor {
    pub fn new(deployer: Arc<DeploymentController>, default_timeout: Duration) -> Self {
        Self {
            deployer,
            default_timeout,
        }
    }

    fn timeout_for(&self, stage: &StageSpec) -> Duration {
        stage
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout)
    }

    async fn run_actions(
        &self,
        stage: &StageSpec,
        ctx: &RunContext,
        progress: &mut Progress,
    ) -> Result<(), RunError> {
        tokio::fs::create_dir_all(&ctx.workspace)
            .await
            .map_err(|e| RunError::ActionFailure(format!("cannot create workspace: {}", e)))?;

        for spec in &stage.actions {
            let action = ProcessAction::from_spec(spec);
            ctx.log_info(format!("[{}] $ {}", stage.name, action.describe()));

            let outcome = action.execute(ctx).await;
            let trimmed = outcome.output.trim();
            if !trimmed.is_empty() {
                ctx.log_info(format!("[{}] {}", stage.name, trimmed));
            }
            progress.output.push_str(&outcome.output);
            progress.exit_code = outcome.exit_code;

            if !outcome.success {
                let status = outcome
                    .exit_code
                    .map(|code| format!("exit status {}", code))
                    .unwrap_or_else(|| trimmed.to_string());
                return Err(RunError::ActionFailure(format!(
                    "'{}' failed: {}",
                    action.describe(),
                    status
                )));
            }
        }
        Ok(())
    }

    async fn deploy(
        &self,
        stage: &StageSpec,
        deploy: &DeploySpec,
        ctx: &RunContext,
        progress: Progress,
        started_at: DateTime<Utc>,
    ) -> StageOutcome {
        let artifact = match ctx.trigger.artifact_id() {
            Ok(id) => Artifact::new(id, deploy.repository.clone()),
            Err(e) => return failed(stage, progress, RunError::from(e), started_at).into(),
        };
        ctx.log_info(format!(
            "[{}] Deploying {} to {}",
            stage.name, artifact, deploy.environment
        ));

        match self.deployer.deploy(deploy, artifact, Some(ctx.run_id)).await {
            Ok(attempt) => {
                let deployment = Some(attempt.record.clone());
                let result = match attempt.error {
                    None => {
                        ctx.log_info(format!(
                            "[{}] {} committed to {}",
                            stage.name, attempt.record.artifact, deploy.environment
                        ));
                        StageResult::succeeded(
                            stage.name.clone(),
                            progress.output,
                            progress.exit_code,
                            started_at,
                        )
                    }
                    Some(err) => failed(stage, progress, RunError::from(err), started_at),
                };
                StageOutcome { result, deployment }
            }
            Err(err) => failed(stage, progress, RunError::from(err), started_at).into(),
        }
    }
}

fn failed(
    stage: &StageSpec,
    progress: Progress,
    err: RunError,
    started_at: DateTime<Utc>,
) -> StageResult {
    StageResult::failed(
        stage.name.clone(),
        progress.output,
        progress.exit_code,
        StageError::new(err.stage_error_kind(), err.to_string()),
        started_at,
    )
}

#[async_trait]
impl StageRunner for StandardStageExecutor {
    async fn run_stage(&self, stage: &StageSpec, ctx: &RunContext) -> StageOutcome {
        let started_at = Utc::now();
        let limit = self.timeout_for(stage);
        info!("Running stage '{}' (timeout {:?})", stage.name, limit);
        ctx.log_info(format!("Starting stage: {}", stage.name));

        let mut progress = Progress::default();
        let actions = tokio::time::timeout(limit, self.run_actions(stage, ctx, &mut progress))
            .await
            .unwrap_or(Err(RunError::Timeout(limit)));

        if let Err(err) = actions {
            warn!("Stage '{}' failed: {}", stage.name, err);
            ctx.log_error(format!("Stage '{}' failed: {}", stage.name, err));
            return failed(stage, progress, err, started_at).into();
        }

        let outcome = match &stage.deploy {
            Some(deploy) => self.deploy(stage, deploy, ctx, progress, started_at).await,
            None => StageResult::succeeded(
                stage.name.clone(),
                progress.output,
                progress.exit_code,
                started_at,
            )
            .into(),
        };

        match &outcome.result.error {
            None => ctx.log_info(format!("Stage '{}' completed", stage.name)),
            Some(err) => ctx.log_error(format!("Stage '{}' failed: {}", stage.name, err)),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use crate::deploy::fakes::{FakeRegistry, FakeTarget, MemoryStore, target_spec};
    use rollout_core::domain::deployment::DeploymentOutcome;
    use rollout_core::domain::pipeline::ActionSpec;
    use rollout_core::domain::stage::{StageErrorKind, StageStatus};

    fn executor(timeout: Duration) -> (StandardStageExecutor, Arc<FakeTarget>) {
        let target = Arc::new(FakeTarget::default());
        let controller = DeploymentController::new(
            Arc::new(FakeRegistry::default()),
            target.clone(),
            target.clone(),
            Arc::new(MemoryStore::default()),
        );
        (
            StandardStageExecutor::new(Arc::new(controller), timeout),
            target,
        )
    }

    fn stage(name: &str, scripts: &[&str]) -> StageSpec {
        scripts
            .iter()
            .fold(StageSpec::new(name), |s, script| s.action(ActionSpec::shell(*script)))
    }

    #[tokio::test]
    async fn test_actions_run_in_order() {
        let (executor, _) = executor(Duration::from_secs(10));
        let outcome = executor
            .run_stage(&stage("build", &["echo one", "echo two"]), &test_context())
            .await;

        assert_eq!(outcome.result.status, StageStatus::Succeeded);
        assert_eq!(outcome.result.output, "one\ntwo\n");
        assert_eq!(outcome.result.exit_code, Some(0));
        assert!(outcome.deployment.is_none());
    }

    #[tokio::test]
    async fn test_first_failing_action_aborts_stage() {
        let (executor, _) = executor(Duration::from_secs(10));
        let outcome = executor
            .run_stage(
                &stage("test", &["echo start", "exit 2", "echo unreachable"]),
                &test_context(),
            )
            .await;

        let result = outcome.result;
        assert_eq!(result.status, StageStatus::Failed);
        assert_eq!(result.exit_code, Some(2));
        assert_eq!(result.error_kind(), Some(StageErrorKind::ActionFailure));
        assert!(!result.output.contains("unreachable"));
    }

    #[tokio::test]
    async fn test_stage_timeout_fails_with_timeout_kind() {
        let (executor, _) = executor(Duration::from_secs(10));
        let mut slow = stage("slow", &["sleep 5"]);
        slow.timeout_ms = Some(100);

        let started = std::time::Instant::now();
        let outcome = executor.run_stage(&slow, &test_context()).await;

        assert_eq!(outcome.result.error_kind(), Some(StageErrorKind::Timeout));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_default_timeout_applies_without_stage_timeout() {
        let (executor, _) = executor(Duration::from_millis(100));
        let outcome = executor
            .run_stage(&stage("slow", &["sleep 5"]), &test_context())
            .await;
        assert_eq!(outcome.result.error_kind(), Some(StageErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_deploy_stage_commits_trigger_artifact() {
        let (executor, target) = executor(Duration::from_secs(10));
        let mut deploy = stage("deploy", &["echo packaged"]);
        deploy.deploy = Some(target_spec());

        let outcome = executor.run_stage(&deploy, &test_context()).await;

        assert_eq!(outcome.result.status, StageStatus::Succeeded);
        let record = outcome.deployment.unwrap();
        assert_eq!(record.outcome, DeploymentOutcome::Committed);
        assert_eq!(record.artifact.id.as_str(), "3f2a9c1");
        assert_eq!(target.live(), Some("3f2a9c1".to_string()));
    }

    #[tokio::test]
    async fn test_failed_deploy_fails_stage_with_deployment_kind() {
        let (executor, target) = executor(Duration::from_secs(10));
        target.mark_unhealthy("3f2a9c1");
        let mut deploy = StageSpec::new("deploy");
        deploy.deploy = Some(target_spec());

        let outcome = executor.run_stage(&deploy, &test_context()).await;

        assert_eq!(
            outcome.result.error_kind(),
            Some(StageErrorKind::Deployment)
        );
        assert_eq!(
            outcome.deployment.map(|r| r.outcome),
            Some(DeploymentOutcome::Inconsistent)
        );
    }
}
