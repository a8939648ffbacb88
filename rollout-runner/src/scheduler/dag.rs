//! Dependency scheduler
//!
//! Runs a validated plan: a stage starts once every dependency succeeded,
//! with at most `max_parallel` stages in flight. The first failure halts
//! the run. Its transitive dependents are skipped at once, stages already
//! running finish, and whatever is still pending is skipped. Cancellation
//! is observed only between stages.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rollout_core::domain::deployment::DeploymentRecord;
use rollout_core::domain::pipeline::StageSpec;
use rollout_core::domain::run::RunStatus;
use rollout_core::domain::stage::{StageError, StageErrorKind, StageResult, StageStatus};
use rollout_lua::LoadedPipeline;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::context::RunContext;

/// Executes a single stage
#[async_trait]
pub trait StageRunner: Send + Sync {
    async fn run_stage(&self, stage: &StageSpec, ctx: &RunContext) -> StageOutcome;
}

/// Receives every finalized stage result as soon as it exists
#[async_trait]
pub trait StageReporter: Send + Sync {
    async fn report(&self, result: &StageResult);
}

#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub result: StageResult,
    /// Record of the deploy attempt made by this stage, if any
    pub deployment: Option<DeploymentRecord>,
}

impl From<StageResult> for StageOutcome {
    fn from(result: StageResult) -> Self {
        Self {
            result,
            deployment: None,
        }
    }
}

/// Final state of a run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    /// One result per stage, in plan order
    pub stages: Vec<StageResult>,
    pub error: Option<String>,
    pub deployment: Option<DeploymentRecord>,
}

impl RunReport {
    /// A run whose definition could not be loaded; no stage ran
    pub fn not_started(error: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            stages: Vec::new(),
            error: Some(error.into()),
            deployment: None,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == name)
    }
}

pub struct DependencyScheduler {
    runner: Arc<dyn StageRunner>,
    reporter: Arc<dyn StageReporter>,
    max_parallel: usize,
}

impl DependencyScheduler {
    pub fn new(
        runner: Arc<dyn StageRunner>,
        reporter: Arc<dyn StageReporter>,
        max_parallel: usize,
    ) -> Self {
        Self {
            runner,
            reporter,
            max_parallel: max_parallel.max(1),
        }
    }

    pub async fn execute(&self, pipeline: &LoadedPipeline, ctx: Arc<RunContext>) -> RunReport {
        let plan = &pipeline.plan;
        let mut status: HashMap<&str, StageStatus> = plan
            .order()
            .iter()
            .map(|name| (name.as_str(), StageStatus::Pending))
            .collect();
        let mut results: HashMap<String, StageResult> = HashMap::new();
        let mut deployment = None;
        let mut halted: Option<String> = None;
        let mut running: JoinSet<StageOutcome> = JoinSet::new();

        info!(
            "Executing {} stage(s) of '{}' for run {}",
            plan.len(),
            pipeline.spec.name,
            ctx.run_id
        );

        loop {
            if halted.is_none() && !ctx.is_cancelled() {
                for name in plan.order() {
                    if running.len() >= self.max_parallel {
                        break;
                    }
                    let ready = status[name.as_str()] == StageStatus::Pending
                        && plan
                            .dependencies(name)
                            .iter()
                            .all(|dep| status[dep.as_str()] == StageStatus::Succeeded);
                    if !ready {
                        continue;
                    }
                    let Some(stage) = pipeline.spec.stage(name) else {
                        continue;
                    };

                    status.insert(name.as_str(), StageStatus::Running);
                    debug!("Starting stage '{}'", name);
                    running.spawn(run_isolated(
                        Arc::clone(&self.runner),
                        stage.clone(),
                        Arc::clone(&ctx),
                    ));
                }
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Stage task failed to join: {}", e);
                    continue;
                }
            };

            let result = outcome.result;
            let name = result.stage.clone();
            if outcome.deployment.is_some() {
                deployment = outcome.deployment;
            }
            if let Some(key) = plan.order().iter().find(|s| **s == name) {
                status.insert(key.as_str(), result.status);
            }
            self.reporter.report(&result).await;

            if !result.is_success() && halted.is_none() {
                let reason = result
                    .error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| result.status.to_string());
                warn!("Stage '{}' failed, halting run: {}", name, reason);
                halted = Some(format!("stage '{}' failed: {}", name, reason));

                for dependent in plan.downstream(&name) {
                    if status[dependent.as_str()] != StageStatus::Pending {
                        continue;
                    }
                    let skipped = StageResult::skipped(
                        dependent.clone(),
                        StageError::new(
                            StageErrorKind::UpstreamFailed,
                            format!("upstream stage '{}' failed", name),
                        ),
                    );
                    self.finalize(&mut status, &mut results, plan.order(), skipped)
                        .await;
                }
            }
            results.insert(name, result);
        }

        // Anything still pending never became eligible
        let leftover = match &halted {
            Some(reason) => StageError::new(
                StageErrorKind::UpstreamFailed,
                format!("run halted: {}", reason),
            ),
            None if ctx.is_cancelled() => {
                StageError::new(StageErrorKind::Cancelled, "run cancelled")
            }
            None => StageError::new(StageErrorKind::UpstreamFailed, "dependencies not satisfied"),
        };
        for name in plan.order() {
            if matches!(
                status[name.as_str()],
                StageStatus::Pending | StageStatus::Running
            ) {
                let skipped = StageResult::skipped(name.clone(), leftover.clone());
                self.finalize(&mut status, &mut results, plan.order(), skipped)
                    .await;
            }
        }

        let cancelled = results
            .values()
            .any(|r| r.error_kind() == Some(StageErrorKind::Cancelled));
        let (run_status, error) = match halted {
            Some(reason) => (RunStatus::Failed, Some(reason)),
            None if cancelled => (RunStatus::Cancelled, Some("cancelled".to_string())),
            None if results.values().all(StageResult::is_success) => (RunStatus::Succeeded, None),
            None => (
                RunStatus::Failed,
                Some("not every stage succeeded".to_string()),
            ),
        };

        info!("Run {} finished: {}", ctx.run_id, run_status);
        RunReport {
            status: run_status,
            stages: plan
                .order()
                .iter()
                .filter_map(|name| results.remove(name))
                .collect(),
            error,
            deployment,
        }
    }

    async fn finalize<'a>(
        &self,
        status: &mut HashMap<&'a str, StageStatus>,
        results: &mut HashMap<String, StageResult>,
        order: &'a [String],
        result: StageResult,
    ) {
        if let Some(key) = order.iter().find(|s| **s == result.stage) {
            status.insert(key.as_str(), result.status);
        }
        self.reporter.report(&result).await;
        results.insert(result.stage.clone(), result);
    }
}

/// Runs a stage on its own task so a panic fails only that stage
async fn run_isolated(
    runner: Arc<dyn StageRunner>,
    stage: StageSpec,
    ctx: Arc<RunContext>,
) -> StageOutcome {
    let name = stage.name.clone();
    let started_at = chrono::Utc::now();
    let handle = tokio::spawn(async move { runner.run_stage(&stage, &ctx).await });

    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => StageResult::failed(
            name,
            String::new(),
            None,
            StageError::new(
                StageErrorKind::ActionFailure,
                format!("stage task aborted: {}", e),
            ),
            started_at,
        )
        .into(),
    }
}
