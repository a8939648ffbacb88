//! Run API Handlers
//!
//! Read endpoints for operators plus the runner-facing execution protocol:
//! claim, stage reports, control polling, logs and completion.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rollout_core::domain::log::LogEntry;
use rollout_core::domain::run::Run;
use rollout_core::domain::stage::StageResult;
use rollout_core::dto::log::LogBatch;
use rollout_core::dto::run::{ClaimRun, CompleteRun, RunControl, RunExecutionInfo};
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::{log_service, run_service};

// =============================================================================
// Queries
// =============================================================================

/// GET /run/list
pub async fn list_runs(State(pool): State<PgPool>) -> ApiResult<Json<Vec<Run>>> {
    Ok(Json(run_service::list_runs(&pool).await?))
}

/// GET /run/list/queued
pub async fn list_queued_runs(State(pool): State<PgPool>) -> ApiResult<Json<Vec<Run>>> {
    Ok(Json(run_service::list_queued_runs(&pool).await?))
}

/// GET /run/{id}
pub async fn get_run(State(pool): State<PgPool>, Path(id): Path<Uuid>) -> ApiResult<Json<Run>> {
    Ok(Json(run_service::get_run(&pool, id).await?))
}

/// GET /run/pipeline/{pipeline_id}
pub async fn list_runs_by_pipeline(
    State(pool): State<PgPool>,
    Path(pipeline_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Run>>> {
    Ok(Json(
        run_service::list_runs_by_pipeline(&pool, pipeline_id).await?,
    ))
}

/// GET /run/{id}/stages
pub async fn list_stages(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<StageResult>>> {
    Ok(Json(run_service::list_stages(&pool, id).await?))
}

/// POST /run/{id}/cancel
pub async fn cancel_run(State(pool): State<PgPool>, Path(id): Path<Uuid>) -> ApiResult<Json<Run>> {
    tracing::info!("Cancelling run: {}", id);
    Ok(Json(run_service::cancel_run(&pool, id).await?))
}

// =============================================================================
// Execution protocol
// =============================================================================

/// POST /run/claim/{id}
pub async fn claim_run(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<ClaimRun>,
) -> ApiResult<Json<RunExecutionInfo>> {
    tracing::info!("Runner {} claiming run: {}", req.runner_id, id);
    Ok(Json(run_service::claim_run(&pool, id, &req.runner_id).await?))
}

/// POST /run/{id}/stage
pub async fn report_stage(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(result): Json<StageResult>,
) -> ApiResult<StatusCode> {
    run_service::report_stage(&pool, id, result).await?;
    Ok(StatusCode::CREATED)
}

/// GET /run/{id}/control
pub async fn run_control(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RunControl>> {
    Ok(Json(run_service::run_control(&pool, id).await?))
}

/// POST /run/{id}/complete
pub async fn complete_run(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteRun>,
) -> ApiResult<StatusCode> {
    run_service::complete_run(&pool, id, req.status, req.result).await?;
    Ok(StatusCode::OK)
}

// =============================================================================
// Logs
// =============================================================================

/// GET /run/{id}/logs
pub async fn get_run_logs(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    Ok(Json(log_service::get_run_logs(&pool, id).await?))
}

/// POST /run/{id}/logs
pub async fn add_run_logs(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
    Json(batch): Json<LogBatch>,
) -> ApiResult<StatusCode> {
    log_service::add_log_entries(&pool, id, batch.entries).await?;
    Ok(StatusCode::OK)
}
