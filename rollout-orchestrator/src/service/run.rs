//! Run Service
//!
//! Run lifecycle: trigger (with optional supersession), claim, stage
//! reporting, completion and cancellation.

use rollout_core::domain::run::{Run, RunResult, RunStatus, Trigger};
use rollout_core::domain::stage::StageResult;
use rollout_core::dto::run::{RunControl, RunExecutionInfo, TriggerRun};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{pipeline_repository, run_repository, stage_repository};

#[derive(Debug)]
pub enum RunError {
    NotFound(Uuid),
    PipelineNotFound(Uuid),
    /// The run is not in a state that allows the operation
    InvalidState(String),
    /// A result for this stage was already recorded
    AlreadyReported(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for RunError {
    fn from(err: sqlx::Error) -> Self {
        RunError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, RunError>;

/// Queue a new run, superseding in-flight runs of the same branch if asked
pub async fn trigger_run(pool: &PgPool, req: TriggerRun) -> Result<Run> {
    validate_trigger(&req.trigger)?;

    pipeline_repository::find_by_id(pool, req.pipeline_id)
        .await?
        .ok_or(RunError::PipelineNotFound(req.pipeline_id))?;

    if req.supersede {
        let (queued, running) =
            run_repository::supersede_branch(pool, req.pipeline_id, &req.trigger.branch).await?;
        if queued + running > 0 {
            tracing::info!(
                "Superseded {} queued and {} running run(s) of {} on {}",
                queued,
                running,
                req.pipeline_id,
                req.trigger.branch
            );
        }
    }

    let run = Run {
        id: Uuid::new_v4(),
        pipeline_id: req.pipeline_id,
        status: RunStatus::Queued,
        trigger: req.trigger,
        requested_at: chrono::Utc::now(),
        started_at: None,
        completed_at: None,
        runner_id: None,
        cancel_requested: false,
        result: None,
    };
    run_repository::insert(pool, &run).await?;

    tracing::info!(
        "Run queued: {} for pipeline {} at {}",
        run.id,
        run.pipeline_id,
        run.trigger.commit
    );

    Ok(run)
}

pub async fn get_run(pool: &PgPool, id: Uuid) -> Result<Run> {
    run_repository::find_by_id(pool, id)
        .await?
        .ok_or(RunError::NotFound(id))
}

pub async fn list_runs(pool: &PgPool) -> Result<Vec<Run>> {
    Ok(run_repository::list_all(pool).await?)
}

pub async fn list_queued_runs(pool: &PgPool) -> Result<Vec<Run>> {
    Ok(run_repository::find_by_status(pool, RunStatus::Queued).await?)
}

pub async fn list_runs_by_pipeline(pool: &PgPool, pipeline_id: Uuid) -> Result<Vec<Run>> {
    pipeline_repository::find_by_id(pool, pipeline_id)
        .await?
        .ok_or(RunError::PipelineNotFound(pipeline_id))?;

    Ok(run_repository::find_by_pipeline(pool, pipeline_id).await?)
}

/// Hand a queued run to a runner
pub async fn claim_run(pool: &PgPool, id: Uuid, runner_id: &str) -> Result<RunExecutionInfo> {
    if runner_id.trim().is_empty() {
        return Err(RunError::ValidationError("runner_id cannot be empty".to_string()));
    }

    let run = get_run(pool, id).await?;
    let pipeline = pipeline_repository::find_by_id(pool, run.pipeline_id)
        .await?
        .ok_or(RunError::PipelineNotFound(run.pipeline_id))?;

    if !run_repository::mark_running(pool, id, runner_id).await? {
        return Err(RunError::InvalidState(format!("Run {} is not queued", id)));
    }

    tracing::info!("Run {} claimed by {}", id, runner_id);

    Ok(RunExecutionInfo {
        run_id: run.id,
        pipeline_id: pipeline.id,
        pipeline_name: pipeline.name,
        pipeline_source: pipeline.script,
        config: pipeline.config,
        trigger: run.trigger,
    })
}

/// Record a finalized stage result, once per stage
pub async fn report_stage(pool: &PgPool, id: Uuid, result: StageResult) -> Result<()> {
    validate_stage_result(&result)?;

    let run = get_run(pool, id).await?;
    if run.status != RunStatus::Running {
        return Err(RunError::InvalidState(format!(
            "Run {} is not running (current: {})",
            id, run.status
        )));
    }

    if !stage_repository::insert(pool, id, &result).await? {
        return Err(RunError::AlreadyReported(result.stage));
    }

    tracing::debug!("Run {} stage {} -> {}", id, result.stage, result.status);
    Ok(())
}

pub async fn list_stages(pool: &PgPool, id: Uuid) -> Result<Vec<StageResult>> {
    get_run(pool, id).await?;
    Ok(stage_repository::find_by_run(pool, id).await?)
}

pub async fn complete_run(
    pool: &PgPool,
    id: Uuid,
    status: RunStatus,
    result: Option<RunResult>,
) -> Result<()> {
    validate_completion_status(status)?;
    get_run(pool, id).await?;

    if !run_repository::mark_completed(pool, id, status, result.as_ref()).await? {
        return Err(RunError::InvalidState(format!("Run {} is not running", id)));
    }

    tracing::info!("Run {} completed with status: {}", id, status);
    Ok(())
}

/// Cancel a queued run, or ask the runner to stop a running one
pub async fn cancel_run(pool: &PgPool, id: Uuid) -> Result<Run> {
    let run = get_run(pool, id).await?;

    let changed = match run.status {
        RunStatus::Queued => run_repository::cancel_queued(pool, id).await?,
        RunStatus::Running => run_repository::request_cancel(pool, id).await?,
        status => {
            return Err(RunError::InvalidState(format!(
                "Cannot cancel run {} in state {}",
                id, status
            )));
        }
    };

    if !changed {
        return Err(RunError::InvalidState(format!(
            "Run {} changed state while cancelling",
            id
        )));
    }

    tracing::info!("Cancellation requested for run {}", id);
    get_run(pool, id).await
}

pub async fn run_control(pool: &PgPool, id: Uuid) -> Result<RunControl> {
    let run = get_run(pool, id).await?;
    Ok(RunControl {
        cancel_requested: run.cancel_requested || run.status == RunStatus::Cancelled,
    })
}

// =============================================================================
// Validation
// =============================================================================

fn validate_trigger(trigger: &Trigger) -> Result<()> {
    if trigger.commit.trim().is_empty() {
        return Err(RunError::ValidationError("commit cannot be empty".to_string()));
    }
    if trigger.branch.trim().is_empty() {
        return Err(RunError::ValidationError("branch cannot be empty".to_string()));
    }
    Ok(())
}

fn validate_completion_status(status: RunStatus) -> Result<()> {
    if status.is_terminal() {
        Ok(())
    } else {
        Err(RunError::ValidationError(format!(
            "Invalid completion status: {}",
            status
        )))
    }
}

fn validate_stage_result(result: &StageResult) -> Result<()> {
    if result.stage.trim().is_empty() {
        return Err(RunError::ValidationError("stage cannot be empty".to_string()));
    }
    if !result.status.is_terminal() {
        return Err(RunError::ValidationError(format!(
            "Stage {} reported in non-final status {}",
            result.stage, result.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollout_core::domain::stage::{StageError, StageErrorKind, StageStatus};

    #[test]
    fn test_validate_completion_status() {
        assert!(validate_completion_status(RunStatus::Succeeded).is_ok());
        assert!(validate_completion_status(RunStatus::Failed).is_ok());
        assert!(validate_completion_status(RunStatus::Cancelled).is_ok());
        assert!(validate_completion_status(RunStatus::Queued).is_err());
        assert!(validate_completion_status(RunStatus::Running).is_err());
    }

    #[test]
    fn test_validate_trigger_requires_commit_and_branch() {
        let mut trigger = Trigger {
            commit: "abc123".to_string(),
            branch: "main".to_string(),
            actor: "dana".to_string(),
        };
        assert!(validate_trigger(&trigger).is_ok());
        trigger.branch = String::new();
        assert!(validate_trigger(&trigger).is_err());
    }

    #[test]
    fn test_validate_stage_result_must_be_final() {
        let mut result = StageResult::skipped(
            "deploy",
            StageError::new(StageErrorKind::UpstreamFailed, "build failed"),
        );
        assert!(validate_stage_result(&result).is_ok());
        result.status = StageStatus::Running;
        assert!(validate_stage_result(&result).is_err());
    }
}
