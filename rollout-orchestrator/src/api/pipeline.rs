//! Pipeline API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rollout_core::domain::pipeline::Pipeline;
use rollout_core::domain::run::Run;
use rollout_core::dto::pipeline::CreatePipeline;
use rollout_core::dto::run::TriggerRun;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::{pipeline_service, run_service};

/// POST /pipeline/create
pub async fn create_pipeline(
    State(pool): State<PgPool>,
    Json(req): Json<CreatePipeline>,
) -> ApiResult<(StatusCode, Json<Pipeline>)> {
    let pipeline = pipeline_service::create_pipeline(&pool, req).await?;
    Ok((StatusCode::CREATED, Json(pipeline)))
}

/// GET /pipeline/list
pub async fn list_pipelines(State(pool): State<PgPool>) -> ApiResult<Json<Vec<Pipeline>>> {
    tracing::debug!("Listing all pipelines");
    Ok(Json(pipeline_service::list_pipelines(&pool).await?))
}

/// GET /pipeline/{id}
pub async fn get_pipeline(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Pipeline>> {
    Ok(Json(pipeline_service::get_pipeline(&pool, id).await?))
}

/// DELETE /pipeline/{id}
pub async fn delete_pipeline(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    pipeline_service::delete_pipeline(&pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /pipeline/trigger
pub async fn trigger_run(
    State(pool): State<PgPool>,
    Json(req): Json<TriggerRun>,
) -> ApiResult<(StatusCode, Json<Run>)> {
    tracing::info!(
        "Triggering pipeline {} at {} ({})",
        req.pipeline_id,
        req.trigger.commit,
        req.trigger.branch
    );
    let run = run_service::trigger_run(&pool, req).await?;
    Ok((StatusCode::CREATED, Json(run)))
}
