//! Log DTOs for inter-service communication

use serde::{Deserialize, Serialize};

use crate::domain::log::LogEntry;

/// Batch of run log entries shipped by a runner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogBatch {
    pub entries: Vec<LogEntry>,
}
