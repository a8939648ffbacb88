//! Source control webhook
//!
//! A push queues a run of the pipeline for the pushed commit and supersedes
//! in-flight runs of the same branch.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rollout_core::domain::run::Run;
use rollout_core::dto::run::{PushEvent, TriggerRun};
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::service::run_service;

/// Commit SHA of a branch deletion push
const NULL_COMMIT: &str = "0000000000000000000000000000000000000000";

/// POST /webhook/push/{pipeline_id}
pub async fn push(
    State(pool): State<PgPool>,
    Path(pipeline_id): Path<Uuid>,
    Json(event): Json<PushEvent>,
) -> ApiResult<(StatusCode, Json<Run>)> {
    if event.after == NULL_COMMIT {
        return Err(ApiError::BadRequest(
            "Branch deletions do not trigger runs".to_string(),
        ));
    }

    let trigger = event.into_trigger();
    tracing::info!(
        "Push to {} by {} ({}) for pipeline {}",
        trigger.branch,
        trigger.actor,
        trigger.commit,
        pipeline_id
    );

    let run = run_service::trigger_run(
        &pool,
        TriggerRun {
            pipeline_id,
            trigger,
            supersede: true,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(run)))
}
