//! Run Repository
//!
//! Database operations for runs. State changes are conditional updates so
//! that concurrent claims or cancels cannot both succeed.

use rollout_core::domain::run::{Run, RunResult, RunStatus, Trigger};
use sqlx::PgPool;
use uuid::Uuid;

const COLUMNS: &str = "id, pipeline_id, status, commit_sha, branch, actor, requested_at, \
                       started_at, completed_at, runner_id, cancel_requested, \
                       result_success, result_error_message";

pub async fn insert(pool: &PgPool, run: &Run) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO runs (id, pipeline_id, status, commit_sha, branch, actor, requested_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(run.id)
    .bind(run.pipeline_id)
    .bind(status_to_string(run.status))
    .bind(&run.trigger.commit)
    .bind(&run.trigger.branch)
    .bind(&run.trigger.actor)
    .bind(run.requested_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Run>, sqlx::Error> {
    let row = sqlx::query_as::<_, RunRow>(&format!("SELECT {} FROM runs WHERE id = $1", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Into::into))
}

/// Runs in `status`, oldest request first
pub async fn find_by_status(pool: &PgPool, status: RunStatus) -> Result<Vec<Run>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {} FROM runs WHERE status = $1 ORDER BY requested_at ASC",
        COLUMNS
    ))
    .bind(status_to_string(status))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn find_by_pipeline(pool: &PgPool, pipeline_id: Uuid) -> Result<Vec<Run>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {} FROM runs WHERE pipeline_id = $1 ORDER BY requested_at DESC",
        COLUMNS
    ))
    .bind(pipeline_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<Run>, sqlx::Error> {
    let rows = sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {} FROM runs ORDER BY requested_at DESC",
        COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Queued -> Running; returns false if the run was not queued anymore
pub async fn mark_running(pool: &PgPool, id: Uuid, runner_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE runs
        SET status = 'Running', started_at = $1, runner_id = $2
        WHERE id = $3 AND status = 'Queued'
        "#,
    )
    .bind(chrono::Utc::now())
    .bind(runner_id)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Running -> terminal status; returns false if the run was not running
pub async fn mark_completed(
    pool: &PgPool,
    id: Uuid,
    status: RunStatus,
    result: Option<&RunResult>,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        r#"
        UPDATE runs
        SET status = $1, completed_at = $2, result_success = $3, result_error_message = $4
        WHERE id = $5 AND status = 'Running'
        "#,
    )
    .bind(status_to_string(status))
    .bind(chrono::Utc::now())
    .bind(result.map(|r| r.success))
    .bind(result.and_then(|r| r.error_message.as_deref()))
    .bind(id)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}

/// Queued -> Cancelled; returns false if the run was not queued
pub async fn cancel_queued(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE runs
        SET status = 'Cancelled', completed_at = $1
        WHERE id = $2 AND status = 'Queued'
        "#,
    )
    .bind(chrono::Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Flags a running run for cancellation at its next stage boundary
pub async fn request_cancel(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE runs SET cancel_requested = TRUE WHERE id = $1 AND status = 'Running'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Cancels queued runs and flags running runs of a pipeline branch
///
/// Returns the number of (queued, running) runs affected.
pub async fn supersede_branch(
    pool: &PgPool,
    pipeline_id: Uuid,
    branch: &str,
) -> Result<(u64, u64), sqlx::Error> {
    let mut tx = pool.begin().await?;

    let queued = sqlx::query(
        r#"
        UPDATE runs
        SET status = 'Cancelled', completed_at = $1
        WHERE pipeline_id = $2 AND branch = $3 AND status = 'Queued'
        "#,
    )
    .bind(chrono::Utc::now())
    .bind(pipeline_id)
    .bind(branch)
    .execute(&mut *tx)
    .await?;

    let running = sqlx::query(
        r#"
        UPDATE runs
        SET cancel_requested = TRUE
        WHERE pipeline_id = $1 AND branch = $2 AND status = 'Running'
        "#,
    )
    .bind(pipeline_id)
    .bind(branch)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok((queued.rows_affected(), running.rows_affected()))
}

// =============================================================================
// Helper Functions
// =============================================================================

fn status_to_string(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Queued => "Queued",
        RunStatus::Running => "Running",
        RunStatus::Succeeded => "Succeeded",
        RunStatus::Failed => "Failed",
        RunStatus::Cancelled => "Cancelled",
    }
}

fn string_to_status(s: &str) -> RunStatus {
    match s {
        "Running" => RunStatus::Running,
        "Succeeded" => RunStatus::Succeeded,
        "Failed" => RunStatus::Failed,
        "Cancelled" => RunStatus::Cancelled,
        _ => RunStatus::Queued,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    pipeline_id: Uuid,
    status: String,
    commit_sha: String,
    branch: String,
    actor: String,
    requested_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    runner_id: Option<String>,
    cancel_requested: bool,
    result_success: Option<bool>,
    result_error_message: Option<String>,
}

impl From<RunRow> for Run {
    fn from(row: RunRow) -> Self {
        Run {
            id: row.id,
            pipeline_id: row.pipeline_id,
            status: string_to_status(&row.status),
            trigger: Trigger {
                commit: row.commit_sha,
                branch: row.branch,
                actor: row.actor,
            },
            requested_at: row.requested_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            runner_id: row.runner_id,
            cancel_requested: row.cancel_requested,
            result: row.result_success.map(|success| RunResult {
                success,
                error_message: row.result_error_message,
            }),
        }
    }
}

