//! Stage Result Repository

use rollout_core::domain::stage::{StageError, StageResult, StageStatus};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

/// Stores a finalized stage result
///
/// Returns false when a result for this stage of the run already exists;
/// finalized results are never overwritten.
pub async fn insert(pool: &PgPool, run_id: Uuid, result: &StageResult) -> Result<bool, sqlx::Error> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO stage_results (
            run_id, stage, status, output, exit_code, error, started_at, finished_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (run_id, stage) DO NOTHING
        "#,
    )
    .bind(run_id)
    .bind(&result.stage)
    .bind(result.status.to_string())
    .bind(&result.output)
    .bind(result.exit_code)
    .bind(result.error.as_ref().map(Json))
    .bind(result.started_at)
    .bind(result.finished_at)
    .execute(pool)
    .await?;

    Ok(inserted.rows_affected() > 0)
}

/// Stage results of a run in the order they were finalized
pub async fn find_by_run(pool: &PgPool, run_id: Uuid) -> Result<Vec<StageResult>, sqlx::Error> {
    let rows = sqlx::query_as::<_, StageRow>(
        r#"
        SELECT stage, status, output, exit_code, error, started_at, finished_at
        FROM stage_results
        WHERE run_id = $1
        ORDER BY id ASC
        "#,
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

fn string_to_status(s: &str) -> StageStatus {
    match s {
        "Running" => StageStatus::Running,
        "Succeeded" => StageStatus::Succeeded,
        "Failed" => StageStatus::Failed,
        "Skipped" => StageStatus::Skipped,
        _ => StageStatus::Pending,
    }
}

#[derive(sqlx::FromRow)]
struct StageRow {
    stage: String,
    status: String,
    output: String,
    exit_code: Option<i32>,
    error: Option<Json<StageError>>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    finished_at: chrono::DateTime<chrono::Utc>,
}

impl From<StageRow> for StageResult {
    fn from(row: StageRow) -> Self {
        StageResult {
            stage: row.stage,
            status: string_to_status(&row.status),
            output: row.output,
            exit_code: row.exit_code,
            error: row.error.map(|e| e.0),
            started_at: row.started_at,
            finished_at: row.finished_at,
        }
    }
}
