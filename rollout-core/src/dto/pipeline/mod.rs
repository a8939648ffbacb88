//! Pipeline DTOs for inter-service communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pipeline::{Pipeline, PipelineConfig};

/// Request to create a new pipeline
///
/// Name and description are taken from the evaluated definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipeline {
    pub script: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub config: Option<PipelineConfig>,
}

/// Listing row for a stored pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Pipeline> for PipelineSummary {
    fn from(pipeline: Pipeline) -> Self {
        Self {
            id: pipeline.id,
            name: pipeline.name,
            description: pipeline.description,
            tags: pipeline.tags,
            created_at: pipeline.created_at,
        }
    }
}
