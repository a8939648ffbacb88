//! Deployment Service
//!
//! Appends deploy attempt records and derives the current pointer of an
//! environment. Records are never updated or deleted.

use rollout_core::domain::deployment::DeploymentRecord;
use rollout_core::dto::deployment::{AcknowledgeDeployment, CurrentDeployment};
use sqlx::PgPool;

use crate::repository::deployment_repository;

#[derive(Debug)]
pub enum DeploymentError {
    ValidationError(String),
    NotInconsistent(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for DeploymentError {
    fn from(err: sqlx::Error) -> Self {
        DeploymentError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, DeploymentError>;

pub async fn record_deployment(pool: &PgPool, record: DeploymentRecord) -> Result<()> {
    record
        .validate()
        .map_err(DeploymentError::ValidationError)?;

    deployment_repository::append(pool, &record).await?;

    tracing::info!(
        "Deployment {} of {} to {}: {}",
        record.id,
        record.artifact,
        record.environment,
        record.outcome
    );
    Ok(())
}

/// History of `environment`, oldest first
pub async fn history(pool: &PgPool, environment: &str) -> Result<Vec<DeploymentRecord>> {
    Ok(deployment_repository::history(pool, environment).await?)
}

pub async fn current(pool: &PgPool, environment: &str) -> Result<CurrentDeployment> {
    let latest = deployment_repository::latest(pool, environment).await?;
    Ok(CurrentDeployment::from_history(
        environment,
        latest.as_slice(),
    ))
}

/// Appends an operator acknowledgement after an Inconsistent attempt
///
/// Deploys to an inconsistent environment are refused until this succeeds.
pub async fn acknowledge(
    pool: &PgPool,
    environment: &str,
    req: AcknowledgeDeployment,
) -> Result<DeploymentRecord> {
    let latest = deployment_repository::latest(pool, environment)
        .await?
        .ok_or_else(|| {
            DeploymentError::NotInconsistent(format!("No deployments recorded for {}", environment))
        })?;
    let record = DeploymentRecord::acknowledgement(&latest, req.live, req.note)
        .map_err(DeploymentError::NotInconsistent)?;

    deployment_repository::append(pool, &record).await?;

    tracing::warn!(
        "Inconsistent state of {} acknowledged; live artifact: {}",
        environment,
        record
            .current
            .as_ref()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    Ok(record)
}
