//! ID resolver module
//!
//! Resolves UUID prefixes to full UUIDs by listing the matching resources
//! from the orchestrator, so users can type short unambiguous prefixes.

use anyhow::{Context, Result};
use rollout_client::OrchestratorClient;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve a pipeline ID or prefix to a full UUID
pub async fn resolve_pipeline_id(client: &OrchestratorClient, input: &str) -> Result<Uuid> {
    let id = IdOrPrefix::parse(input);
    if let IdOrPrefix::Full(uuid) = id {
        return Ok(uuid);
    }

    let pipelines = client
        .list_pipelines()
        .await
        .context("Failed to fetch pipelines for ID resolution")?;
    id.resolve_among("pipeline", pipelines.iter().map(|p| p.id))
}

/// Resolve a run ID or prefix to a full UUID
///
/// Searches every run the orchestrator knows about, in any status.
pub async fn resolve_run_id(client: &OrchestratorClient, input: &str) -> Result<Uuid> {
    let id = IdOrPrefix::parse(input);
    if let IdOrPrefix::Full(uuid) = id {
        return Ok(uuid);
    }

    let runs = client
        .list_runs()
        .await
        .context("Failed to fetch runs for ID resolution")?;
    id.resolve_among("run", runs.iter().map(|r| r.id))
}
