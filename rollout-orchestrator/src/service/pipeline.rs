//! Pipeline Service
//!
//! Pipeline definitions are validated with the same loader the runner uses
//! before they are stored, so a stored pipeline always has a valid plan.

use rollout_core::domain::pipeline::Pipeline;
use rollout_core::dto::pipeline::CreatePipeline;
use rollout_lua::{LoadedPipeline, NoVars, load_pipeline};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::pipeline_repository;

#[derive(Debug)]
pub enum PipelineError {
    NotFound(Uuid),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Validate and store a new pipeline
pub async fn create_pipeline(pool: &PgPool, req: CreatePipeline) -> Result<Pipeline> {
    let loaded = validate_pipeline_request(&req)?;

    let now = chrono::Utc::now();
    let pipeline = Pipeline {
        id: Uuid::new_v4(),
        name: loaded.spec.name,
        description: loaded.spec.description,
        script: req.script,
        created_at: now,
        updated_at: now,
        tags: req.tags,
        config: req.config.unwrap_or_default(),
    };

    pipeline_repository::insert(pool, &pipeline).await?;

    tracing::info!(
        "Pipeline created: {} ({}) with stages {:?}",
        pipeline.name,
        pipeline.id,
        loaded.plan.order()
    );

    Ok(pipeline)
}

pub async fn get_pipeline(pool: &PgPool, id: Uuid) -> Result<Pipeline> {
    pipeline_repository::find_by_id(pool, id)
        .await?
        .ok_or(PipelineError::NotFound(id))
}

pub async fn list_pipelines(pool: &PgPool) -> Result<Vec<Pipeline>> {
    Ok(pipeline_repository::list_all(pool).await?)
}

pub async fn delete_pipeline(pool: &PgPool, id: Uuid) -> Result<()> {
    if !pipeline_repository::delete(pool, id).await? {
        return Err(PipelineError::NotFound(id));
    }

    tracing::info!("Pipeline deleted: {}", id);
    Ok(())
}

// =============================================================================
// Validation
// =============================================================================

fn validate_pipeline_request(req: &CreatePipeline) -> Result<LoadedPipeline> {
    if req.script.trim().is_empty() {
        return Err(PipelineError::ValidationError(
            "Pipeline script cannot be empty".to_string(),
        ));
    }

    if let Some(config) = &req.config {
        if config.max_parallel_stages == 0 {
            return Err(PipelineError::ValidationError(
                "max_parallel_stages must be at least 1".to_string(),
            ));
        }
    }

    let loaded = load_pipeline(&req.script, NoVars)
        .map_err(|e| PipelineError::ValidationError(format!("Invalid pipeline: {:#}", e)))?;

    if loaded.spec.name.trim().is_empty() || loaded.spec.name.len() > 255 {
        return Err(PipelineError::ValidationError(
            "Pipeline name must be between 1 and 255 characters".to_string(),
        ));
    }

    Ok(loaded)
}
