//! Run poller
//!
//! Polls the orchestrator for queued runs and executes each claimed run on
//! its own task, bounded by a per-runner semaphore. While a run executes,
//! its logs are shipped periodically and its cancellation flag is polled.

use anyhow::{Context as AnyhowContext, Result};
use async_trait::async_trait;
use rollout_client::OrchestratorClient;
use rollout_core::domain::run::{RunResult, RunStatus};
use rollout_core::domain::stage::StageResult;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{self, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::context::RunContext;
use crate::scheduler::dag::StageReporter;
use crate::service::ExecutionService;

/// Continuously polls for and executes runs
pub struct RunPoller {
    config: Config,
    client: Arc<OrchestratorClient>,
    service: Arc<ExecutionService>,
    semaphore: Arc<Semaphore>,
}

impl RunPoller {
    pub fn new(
        config: Config,
        client: Arc<OrchestratorClient>,
        service: Arc<ExecutionService>,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_parallel_runs));
        Self {
            config,
            client,
            service,
            semaphore,
        }
    }

    /// Starts the polling loop
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting run poller (interval: {:?})",
            self.config.poll_interval
        );

        let mut interval = time::interval(self.config.poll_interval);

        loop {
            interval.tick().await;

            debug!("Polling for queued runs");

            match self.poll_once().await {
                Ok(started) if started > 0 => info!("Started {} run(s) this cycle", started),
                Ok(_) => {}
                Err(e) => error!("Error during poll cycle: {:#}", e),
            }
        }
    }

    /// Claims as many queued runs as there are free slots
    async fn poll_once(&self) -> Result<usize> {
        let runs = self
            .client
            .list_queued_runs()
            .await
            .context("Failed to fetch queued runs")?;

        if runs.is_empty() {
            debug!("No runs queued");
            return Ok(0);
        }

        let mut started = 0;
        for run in runs {
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                debug!("Max parallel runs reached, leaving {} queued", run.id);
                break;
            };

            let config = self.config.clone();
            let client = Arc::clone(&self.client);
            let service = Arc::clone(&self.service);
            tokio::spawn(async move {
                if let Err(e) = execute_run(run.id, config, client, service).await {
                    error!("Failed to execute run {}: {:#}", run.id, e);
                }
                drop(permit);
            });
            started += 1;
        }

        Ok(started)
    }
}

/// Claims and executes a single run, then completes it and notifies
async fn execute_run(
    run_id: Uuid,
    config: Config,
    client: Arc<OrchestratorClient>,
    service: Arc<ExecutionService>,
) -> Result<()> {
    let info = match client.claim_run(run_id, &config.runner_id).await {
        Ok(info) => info,
        Err(e) if e.is_conflict() => {
            debug!("Run {} was claimed elsewhere", run_id);
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to claim run"),
    };

    info!(
        "Claimed run {} (pipeline {}, commit {})",
        run_id, info.pipeline_name, info.trigger.commit
    );

    let ctx = RunContext::new(
        run_id,
        info.trigger.clone(),
        &config.workspace_base,
        &info.config.env_vars,
    );

    let log_sender = spawn_log_sender(Arc::clone(&ctx), Arc::clone(&client), config.log_send_interval);
    let cancel_watcher =
        spawn_cancel_watcher(Arc::clone(&ctx), Arc::clone(&client), config.cancel_poll_interval);

    let reporter = Arc::new(OrchestratorReporter {
        run_id,
        client: Arc::clone(&client),
    });
    let report = service.execute(&info, Arc::clone(&ctx), reporter).await;

    cancel_watcher.abort();
    log_sender.abort();

    let remaining = ctx.drain_logs();
    if !remaining.is_empty() {
        if let Err(e) = client.send_logs(run_id, remaining).await {
            warn!("Failed to send final logs for run {}: {:#}", run_id, e);
        }
    }

    let result = RunResult {
        success: report.status == RunStatus::Succeeded,
        error_message: report.error.clone(),
    };
    let completed = client
        .complete_run(run_id, report.status, result)
        .await
        .context("Failed to complete run");

    service.notify(&info, &report).await;

    if let Err(e) = tokio::fs::remove_dir_all(&ctx.workspace).await {
        debug!("Workspace {} not removed: {}", ctx.workspace.display(), e);
    }

    completed
}

/// Posts each stage result to the orchestrator as it is finalized
struct OrchestratorReporter {
    run_id: Uuid,
    client: Arc<OrchestratorClient>,
}

#[async_trait]
impl StageReporter for OrchestratorReporter {
    async fn report(&self, result: &StageResult) {
        if let Err(e) = self.client.report_stage(self.run_id, result).await {
            warn!(
                "Failed to report stage '{}' of run {}: {:#}",
                result.stage, self.run_id, e
            );
        }
    }
}

/// Ships buffered run logs every `interval`
fn spawn_log_sender(
    ctx: Arc<RunContext>,
    client: Arc<OrchestratorClient>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);

        loop {
            ticker.tick().await;

            let logs = ctx.drain_logs();
            if logs.is_empty() {
                continue;
            }

            debug!("Sending {} logs for run {}", logs.len(), ctx.run_id);
            if let Err(e) = client.send_logs(ctx.run_id, logs).await {
                error!("Failed to send logs for run {}: {:#}", ctx.run_id, e);
            }
        }
    })
}

/// Cancels the run's token once the orchestrator asks for it
fn spawn_cancel_watcher(
    ctx: Arc<RunContext>,
    client: Arc<OrchestratorClient>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            time::sleep(interval).await;

            match client.run_control(ctx.run_id).await {
                Ok(control) if control.cancel_requested => {
                    info!("Cancellation requested for run {}", ctx.run_id);
                    ctx.log_warning("Cancellation requested, no further stages will start");
                    ctx.cancel();
                    break;
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to poll control for run {}: {:#}", ctx.run_id, e),
            }
        }
    })
}
