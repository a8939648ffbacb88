//! Log Service
//!
//! Run log ingestion with batch limits.

use rollout_core::domain::log::LogEntry;
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{log_repository, run_repository};

const MAX_MESSAGE_LENGTH: usize = 10_000;
const MAX_BATCH_SIZE: usize = 1000;

#[derive(Debug)]
pub enum LogError {
    RunNotFound(Uuid),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for LogError {
    fn from(err: sqlx::Error) -> Self {
        LogError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, LogError>;

pub async fn add_log_entries(pool: &PgPool, run_id: Uuid, entries: Vec<LogEntry>) -> Result<()> {
    validate_log_entries(&entries)?;

    if entries.is_empty() {
        return Ok(());
    }

    run_repository::find_by_id(pool, run_id)
        .await?
        .ok_or(LogError::RunNotFound(run_id))?;

    log_repository::add_entries(pool, run_id, &entries).await?;

    tracing::debug!("Added {} log entries for run: {}", entries.len(), run_id);
    Ok(())
}

pub async fn get_run_logs(pool: &PgPool, run_id: Uuid) -> Result<Vec<LogEntry>> {
    run_repository::find_by_id(pool, run_id)
        .await?
        .ok_or(LogError::RunNotFound(run_id))?;

    Ok(log_repository::find_by_run(pool, run_id).await?)
}

fn validate_log_entries(entries: &[LogEntry]) -> Result<()> {
    if entries.len() > MAX_BATCH_SIZE {
        return Err(LogError::ValidationError(format!(
            "Too many log entries in batch (max: {})",
            MAX_BATCH_SIZE
        )));
    }

    if let Some(i) = entries
        .iter()
        .position(|e| e.message.len() > MAX_MESSAGE_LENGTH)
    {
        return Err(LogError::ValidationError(format!(
            "Log entry {} message too long (max: {} chars)",
            i, MAX_MESSAGE_LENGTH
        )));
    }

    Ok(())
}
