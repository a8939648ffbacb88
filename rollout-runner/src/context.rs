//! Execution context for a run
//!
//! Holds everything a run's stages share:
//! - Log buffer, drained periodically and shipped to the orchestrator
//! - Workspace directory the actions run in
//! - Environment exported to every action
//! - Cancellation token observed at stage boundaries

use rollout_core::domain::log::{LogEntry, LogLevel};
use rollout_core::domain::run::Trigger;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Execution context shared across the stages of one run
pub struct RunContext {
    pub run_id: Uuid,
    pub trigger: Trigger,
    /// Working directory for every action of the run
    pub workspace: PathBuf,
    env: HashMap<String, String>,
    cancel: CancellationToken,
    log_buffer: Mutex<Vec<LogEntry>>,
}

impl RunContext {
    /// Creates a context whose workspace is `<workspace_base>/<run_id>`
    ///
    /// `env_vars` are the pipeline's variables; the trigger variables
    /// (`COMMIT`, `BRANCH`, `ACTOR`) override them.
    pub fn new(
        run_id: Uuid,
        trigger: Trigger,
        workspace_base: &Path,
        env_vars: &HashMap<String, String>,
    ) -> Arc<Self> {
        let mut env = env_vars.clone();
        env.extend(trigger.variables());

        Arc::new(Self {
            run_id,
            trigger,
            workspace: workspace_base.join(run_id.to_string()),
            env,
            cancel: CancellationToken::new(),
            log_buffer: Mutex::new(Vec::new()),
        })
    }

    /// Variables exported to every action
    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// Requests cancellation; stages already running still complete
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Adds a log entry to the buffer
    pub fn add_log(&self, entry: LogEntry) {
        let mut buffer = self.log_buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.push(entry);
    }

    pub fn log_info(&self, message: impl Into<String>) {
        self.add_log(LogEntry::now(LogLevel::Info, message));
    }

    pub fn log_warning(&self, message: impl Into<String>) {
        self.add_log(LogEntry::now(LogLevel::Warning, message));
    }

    pub fn log_error(&self, message: impl Into<String>) {
        self.add_log(LogEntry::now(LogLevel::Error, message));
    }

    /// Returns all buffered entries and clears the buffer
    pub fn drain_logs(&self) -> Vec<LogEntry> {
        let mut buffer = self.log_buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.drain(..).collect()
    }
}

#[cfg(test)]
pub(crate) fn test_context() -> Arc<RunContext> {
    let trigger = Trigger {
        commit: "3f2a9c1".to_string(),
        branch: "main".to_string(),
        actor: "alice".to_string(),
    };
    RunContext::new(
        Uuid::new_v4(),
        trigger,
        &std::env::temp_dir().join("rollout-tests"),
        &HashMap::new(),
    )
}
