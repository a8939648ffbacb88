//! Execution service
//!
//! Loads a run's pipeline definition with the trigger variables, then
//! hands the plan to the dependency scheduler with a stage executor
//! configured from the pipeline and runner limits.

use std::sync::Arc;
use std::time::Duration;

use rollout_core::domain::run::RunStatus;
use rollout_core::dto::notification::{NotificationPayload, NotificationStatus};
use rollout_core::dto::run::RunExecutionInfo;
use rollout_lua::{TriggerVars, load_pipeline};
use tracing::{error, info};

use crate::config::Config;
use crate::context::RunContext;
use crate::deploy::DeploymentController;
use crate::executor::StandardStageExecutor;
use crate::notifier::Notifier;
use crate::scheduler::{DependencyScheduler, RunReport, StageReporter};

pub struct ExecutionService {
    deployer: Arc<DeploymentController>,
    notifier: Arc<dyn Notifier>,
    max_parallel_stages: usize,
    stage_timeout: Duration,
}

impl ExecutionService {
    pub fn new(
        deployer: Arc<DeploymentController>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        Self {
            deployer,
            notifier,
            max_parallel_stages: config.max_parallel_stages,
            stage_timeout: config.stage_timeout,
        }
    }

    /// Executes a claimed run
    ///
    /// A definition that fails to load or plan yields a failed report
    /// without running any stage.
    pub async fn execute(
        &self,
        info: &RunExecutionInfo,
        ctx: Arc<RunContext>,
        reporter: Arc<dyn StageReporter>,
    ) -> RunReport {
        let vars = TriggerVars::new(Some(&info.trigger), &info.config.env_vars);
        let pipeline = match load_pipeline(&info.pipeline_source, vars) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!("Run {} has an invalid pipeline: {:#}", info.run_id, e);
                ctx.log_error(format!("Invalid pipeline definition: {:#}", e));
                return RunReport::not_started(format!("configuration error: {:#}", e));
            }
        };

        ctx.log_info(format!(
            "Pipeline {} at {} on {}, stage order: {}",
            pipeline.spec.name,
            info.trigger.commit,
            info.trigger.branch,
            pipeline.plan.order().join(" -> ")
        ));

        let stage_timeout = info
            .config
            .stage_timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.stage_timeout);
        let parallel = info.config.max_parallel_stages.min(self.max_parallel_stages);

        let executor = Arc::new(StandardStageExecutor::new(
            Arc::clone(&self.deployer),
            stage_timeout,
        ));
        let report = DependencyScheduler::new(executor, reporter, parallel)
            .execute(&pipeline, Arc::clone(&ctx))
            .await;

        info!("Run {} finished with status {}", info.run_id, report.status);
        report
    }

    /// Sends the run's single notification
    pub async fn notify(&self, info: &RunExecutionInfo, report: &RunReport) {
        self.notifier.notify(&notification_for(info, report)).await;
    }
}

/// Notification describing how a run ended
///
/// Cancelled runs are reported as failed with `cancelled` as the detail.
pub fn notification_for(info: &RunExecutionInfo, report: &RunReport) -> NotificationPayload {
    let status = match report.status {
        RunStatus::Succeeded => NotificationStatus::Succeeded,
        _ => NotificationStatus::Failed,
    };
    let artifact_id = report
        .deployment
        .as_ref()
        .map(|record| record.artifact.id.to_string())
        .or_else(|| info.trigger.artifact_id().ok().map(|id| id.to_string()));

    NotificationPayload::new(
        status,
        info.pipeline_name.clone(),
        info.run_id,
        artifact_id,
        info.trigger.actor.clone(),
        info.trigger.branch.clone(),
        report.error.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::DeploymentStore;
    use crate::deploy::fakes::{FakeRegistry, FakeTarget, MemoryStore, artifact};
    use crate::notifier::testing::RecordingNotifier;
    use crate::scheduler::testing::CollectingReporter;
    use rollout_core::domain::deployment::DeploymentOutcome;
    use rollout_core::domain::pipeline::PipelineConfig;
    use rollout_core::domain::run::Trigger;
    use rollout_core::domain::stage::{StageErrorKind, StageStatus};
    use uuid::Uuid;

    const WEB_PIPELINE: &str = r#"
        local test_cmd = env.get("TEST_CMD") or "true"
        return pipeline.define {
            name = "web",
            stages = {
                pipeline.stage { name = "test", run = test_cmd },
                pipeline.stage { name = "build", needs = "test", run = "echo built $COMMIT" },
                pipeline.stage {
                    name = "deploy",
                    needs = "build",
                    deploy = pipeline.deploy {
                        environment = "production",
                        repository = "registry.local/web",
                        container = "web",
                        health = {
                            url = "http://localhost:8080/health",
                            retries = 3,
                            interval = 0.001,
                            timeout = 0.2,
                        },
                    },
                },
            },
        }
    "#;

    struct Harness {
        target: Arc<FakeTarget>,
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
        service: ExecutionService,
    }

    fn harness() -> Harness {
        let target = Arc::new(FakeTarget::default());
        let store = Arc::new(MemoryStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let deployer = Arc::new(DeploymentController::new(
            Arc::new(FakeRegistry::default()),
            target.clone(),
            target.clone(),
            store.clone(),
        ));
        let service = ExecutionService::new(deployer, notifier.clone(), &Config::default());
        Harness {
            target,
            store,
            notifier,
            service,
        }
    }

    fn run_info(commit: &str, test_cmd: &str) -> RunExecutionInfo {
        let mut config = PipelineConfig::default();
        config
            .env_vars
            .insert("TEST_CMD".to_string(), test_cmd.to_string());
        RunExecutionInfo {
            run_id: Uuid::new_v4(),
            pipeline_id: Uuid::new_v4(),
            pipeline_name: "web".to_string(),
            pipeline_source: WEB_PIPELINE.to_string(),
            config,
            trigger: Trigger {
                commit: commit.to_string(),
                branch: "main".to_string(),
                actor: "alice".to_string(),
            },
        }
    }

    /// Mirrors the poller: execute, then notify once
    async fn run(h: &Harness, info: &RunExecutionInfo) -> (RunReport, Vec<StageStatus>) {
        let ctx = RunContext::new(
            info.run_id,
            info.trigger.clone(),
            &std::env::temp_dir().join("rollout-tests"),
            &info.config.env_vars,
        );
        let reporter = Arc::new(CollectingReporter::default());
        let report = h.service.execute(info, ctx, reporter.clone()).await;
        h.service.notify(info, &report).await;
        let reported = reporter.reported().iter().map(|r| r.status).collect();
        (report, reported)
    }

    #[tokio::test]
    async fn test_failing_tests_skip_build_and_deploy() {
        let h = harness();
        let info = run_info("3f2a9c1", "exit 1");

        let (report, reported) = run(&h, &info).await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.stage("test").unwrap().status, StageStatus::Failed);
        for name in ["build", "deploy"] {
            let stage = report.stage(name).unwrap();
            assert_eq!(stage.status, StageStatus::Skipped);
            assert_eq!(stage.error_kind(), Some(StageErrorKind::UpstreamFailed));
        }
        assert_eq!(reported.len(), 3);
        assert!(h.target.calls().is_empty());
        assert!(h.store.records().is_empty());

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, NotificationStatus::Failed);
        assert_eq!(sent[0].artifact_id.as_deref(), Some("3f2a9c1"));
        assert_eq!(sent[0].actor, "alice");
    }

    #[tokio::test]
    async fn test_unhealthy_release_rolls_back_to_previous() {
        let h = harness();

        let (first, _) = run(&h, &run_info("aaaaaaa", "true")).await;
        assert_eq!(first.status, RunStatus::Succeeded);

        h.target.mark_unhealthy("bbbbbbb");
        let (second, _) = run(&h, &run_info("bbbbbbb", "true")).await;

        assert_eq!(second.status, RunStatus::Failed);
        let deploy = second.stage("deploy").unwrap();
        assert_eq!(deploy.error_kind(), Some(StageErrorKind::Deployment));

        let record = second.deployment.as_ref().unwrap();
        assert_eq!(record.outcome, DeploymentOutcome::RolledBack);
        assert_eq!(record.previous, Some(artifact("aaaaaaa")));
        assert_eq!(record.current, Some(artifact("aaaaaaa")));
        assert_eq!(
            h.store.current("production").await.unwrap().artifact,
            Some(artifact("aaaaaaa"))
        );
        assert_eq!(h.target.live(), Some("aaaaaaa".to_string()));

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].status, NotificationStatus::Succeeded);
        assert_eq!(sent[1].status, NotificationStatus::Failed);
        assert_eq!(sent[1].artifact_id.as_deref(), Some("bbbbbbb"));
    }

    #[tokio::test]
    async fn test_invalid_definition_runs_nothing() {
        let h = harness();
        let mut info = run_info("3f2a9c1", "true");
        info.pipeline_source = r#"
            return pipeline.define {
                name = "loop",
                stages = {
                    pipeline.stage { name = "a", needs = "b", run = "true" },
                    pipeline.stage { name = "b", needs = "a", run = "true" },
                },
            }
        "#
        .to_string();

        let (report, reported) = run(&h, &info).await;

        assert_eq!(report.status, RunStatus::Failed);
        assert!(report.stages.is_empty());
        assert!(reported.is_empty());
        assert!(report.error.as_deref().unwrap().contains("cycle"));
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[test]
    fn test_cancelled_run_notifies_failure() {
        let info = run_info("3f2a9c1", "true");
        let report = RunReport {
            status: RunStatus::Cancelled,
            stages: Vec::new(),
            error: Some("cancelled".to_string()),
            deployment: None,
        };
        let payload = notification_for(&info, &report);
        assert_eq!(payload.status, NotificationStatus::Failed);
        assert_eq!(payload.detail.as_deref(), Some("cancelled"));
    }
}
