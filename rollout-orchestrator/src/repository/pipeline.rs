//! Pipeline Repository
//!
//! Database operations for stored pipeline definitions.

use std::collections::HashMap;

use rollout_core::domain::pipeline::{Pipeline, PipelineConfig};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

const COLUMNS: &str = "id, name, description, script, created_at, updated_at, tags, \
                       max_parallel_stages, stage_timeout_seconds, env_vars";

/// Insert a fully built pipeline
pub async fn insert(pool: &PgPool, pipeline: &Pipeline) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO pipelines (
            id, name, description, script, created_at, updated_at, tags,
            max_parallel_stages, stage_timeout_seconds, env_vars
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(pipeline.id)
    .bind(&pipeline.name)
    .bind(&pipeline.description)
    .bind(&pipeline.script)
    .bind(pipeline.created_at)
    .bind(pipeline.updated_at)
    .bind(&pipeline.tags)
    .bind(pipeline.config.max_parallel_stages as i32)
    .bind(pipeline.config.stage_timeout_seconds.map(|t| t as i64))
    .bind(Json(&pipeline.config.env_vars))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Pipeline>, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineRow>(&format!(
        "SELECT {} FROM pipelines WHERE id = $1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Into::into))
}

/// All pipelines, newest first
pub async fn list_all(pool: &PgPool) -> Result<Vec<Pipeline>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PipelineRow>(&format!(
        "SELECT {} FROM pipelines ORDER BY created_at DESC",
        COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM pipelines WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    script: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    tags: Vec<String>,
    max_parallel_stages: i32,
    stage_timeout_seconds: Option<i64>,
    env_vars: Json<HashMap<String, String>>,
}

impl From<PipelineRow> for Pipeline {
    fn from(row: PipelineRow) -> Self {
        Pipeline {
            id: row.id,
            name: row.name,
            description: row.description,
            script: row.script,
            created_at: row.created_at,
            updated_at: row.updated_at,
            tags: row.tags,
            config: PipelineConfig {
                max_parallel_stages: row.max_parallel_stages.max(1) as usize,
                stage_timeout_seconds: row.stage_timeout_seconds.map(|t| t as u64),
                env_vars: row.env_vars.0,
            },
        }
    }
}
