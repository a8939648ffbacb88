//! Deployment Record API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use rollout_core::domain::deployment::DeploymentRecord;
use rollout_core::dto::deployment::{AcknowledgeDeployment, CurrentDeployment};
use sqlx::PgPool;

use crate::api::error::ApiResult;
use crate::service::deployment_service;

/// POST /deployment
pub async fn record_deployment(
    State(pool): State<PgPool>,
    Json(record): Json<DeploymentRecord>,
) -> ApiResult<StatusCode> {
    deployment_service::record_deployment(&pool, record).await?;
    Ok(StatusCode::CREATED)
}

/// GET /deployment/{environment}
pub async fn history(
    State(pool): State<PgPool>,
    Path(environment): Path<String>,
) -> ApiResult<Json<Vec<DeploymentRecord>>> {
    Ok(Json(deployment_service::history(&pool, &environment).await?))
}

/// GET /deployment/{environment}/current
pub async fn current(
    State(pool): State<PgPool>,
    Path(environment): Path<String>,
) -> ApiResult<Json<CurrentDeployment>> {
    Ok(Json(deployment_service::current(&pool, &environment).await?))
}

/// POST /deployment/{environment}/acknowledge
pub async fn acknowledge(
    State(pool): State<PgPool>,
    Path(environment): Path<String>,
    Json(req): Json<AcknowledgeDeployment>,
) -> ApiResult<(StatusCode, Json<DeploymentRecord>)> {
    let record = deployment_service::acknowledge(&pool, &environment, req).await?;
    Ok((StatusCode::CREATED, Json(record)))
}
