//! Deployment Record Repository
//!
//! Append-only history of deploy attempts. Records are stored whole as JSON
//! next to the columns used for filtering.

use rollout_core::domain::deployment::DeploymentRecord;
use sqlx::PgPool;
use sqlx::types::Json;

pub async fn append(pool: &PgPool, record: &DeploymentRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO deployments (id, environment, artifact_id, outcome, run_id, recorded_at, record)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(record.id)
    .bind(&record.environment)
    .bind(record.artifact.id.as_str())
    .bind(record.outcome.as_str())
    .bind(record.run_id)
    .bind(record.recorded_at)
    .bind(Json(record))
    .execute(pool)
    .await?;

    Ok(())
}

/// Every record of `environment` in append order
pub async fn history(pool: &PgPool, environment: &str) -> Result<Vec<DeploymentRecord>, sqlx::Error> {
    let rows: Vec<(Json<DeploymentRecord>,)> = sqlx::query_as(
        "SELECT record FROM deployments WHERE environment = $1 ORDER BY seq ASC",
    )
    .bind(environment)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(record,)| record.0).collect())
}

/// Most recent record of `environment`
pub async fn latest(pool: &PgPool, environment: &str) -> Result<Option<DeploymentRecord>, sqlx::Error> {
    let row: Option<(Json<DeploymentRecord>,)> = sqlx::query_as(
        "SELECT record FROM deployments WHERE environment = $1 ORDER BY seq DESC LIMIT 1",
    )
    .bind(environment)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(record,)| record.0))
}
