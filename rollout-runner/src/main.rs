//! Rollout Runner
//!
//! A stateless worker that claims queued runs from the orchestrator and
//! executes them.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Scheduler: Run polling, lifecycle and dependency-ordered stage execution
//! - Executor: Stage actions as local processes under a timeout
//! - Deploy: Publish, remote update, health verification and rollback
//! - Notifier: One webhook notification per finished run

mod config;
mod context;
mod deploy;
mod error;
mod executor;
mod notifier;
mod scheduler;
mod service;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::deploy::{
    ContainerHost, ContainerRegistry, DeploymentController, HttpHealthProbe,
    OrchestratorDeploymentStore,
};
use crate::notifier::WebhookNotifier;
use crate::scheduler::RunPoller;
use crate::service::ExecutionService;
use rollout_client::OrchestratorClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollout_runner=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Rollout Runner");

    let config = load_config()?;
    info!(
        "Loaded configuration: runner_id={}, orchestrator_url={}",
        config.runner_id, config.orchestrator_url
    );

    let client = Arc::new(OrchestratorClient::new(config.orchestrator_url.clone()));
    wait_for_orchestrator(&client).await?;

    let http = reqwest::Client::new();
    let deployer = Arc::new(DeploymentController::new(
        Arc::new(ContainerRegistry::new(config.container_cli.clone())),
        Arc::new(ContainerHost::new(
            config.container_cli.clone(),
            config.ssh_binary.clone(),
        )),
        Arc::new(HttpHealthProbe::new(http.clone())),
        Arc::new(OrchestratorDeploymentStore::new(Arc::clone(&client))),
    ));

    if config.notify_webhook_url.is_none() {
        info!("NOTIFY_WEBHOOK_URL not set, notifications are only logged");
    }
    let notifier = Arc::new(WebhookNotifier::new(
        http,
        config.notify_webhook_url.clone(),
        config.notify_timeout,
    ));

    let service = Arc::new(ExecutionService::new(deployer, notifier, &config));
    let poller = RunPoller::new(config.clone(), client, service);

    info!(
        "Runner initialized: {} parallel run(s), {} parallel stage(s), poll every {:?}",
        config.max_parallel_runs, config.max_parallel_stages, config.poll_interval
    );

    if let Err(e) = poller.run().await {
        error!("Poller error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            info!("{}, using default configuration", e);
            Config::default()
        }
    };
    config.validate()?;
    Ok(config)
}

/// Waits for the orchestrator with exponential backoff
///
/// The orchestrator may not be up yet when the runner starts, which is
/// common in container environments.
async fn wait_for_orchestrator(client: &OrchestratorClient) -> Result<()> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut delay_ms = INITIAL_DELAY_MS;

    for attempt in 1..=MAX_RETRIES {
        match client.health().await {
            Ok(()) => {
                if attempt > 1 {
                    info!("Orchestrator reachable after {} attempt(s)", attempt);
                }
                return Ok(());
            }
            Err(e) if attempt < MAX_RETRIES => {
                warn!(
                    "Orchestrator not reachable (attempt {}/{}): {}, retrying in {} ms",
                    attempt, MAX_RETRIES, e, delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Orchestrator unreachable after {} attempts: {}",
                    MAX_RETRIES,
                    e
                ));
            }
        }
    }

    Ok(())
}
