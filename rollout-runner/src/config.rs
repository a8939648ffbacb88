//! Runner configuration
//!
//! Polling cadence, parallelism limits, stage timeouts and the external
//! tools used for deployments. Loaded from the environment with defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this runner instance
    pub runner_id: String,

    /// Orchestrator base URL (e.g., "http://localhost:8080")
    pub orchestrator_url: String,

    /// How often to poll the orchestrator for queued runs
    pub poll_interval: Duration,

    /// How often to ship buffered run logs
    pub log_send_interval: Duration,

    /// How often a running run checks whether cancellation was requested
    pub cancel_poll_interval: Duration,

    /// Runs executed concurrently by this runner
    pub max_parallel_runs: usize,

    /// Upper bound on stages running at once in a single run.
    /// A pipeline's own limit applies when it is lower.
    pub max_parallel_stages: usize,

    /// Fallback stage timeout when neither the stage nor the pipeline sets one
    pub stage_timeout: Duration,

    /// Directory under which each run gets its own workspace
    pub workspace_base: PathBuf,

    /// Container CLI used to push, pull and start images
    pub container_cli: String,

    /// SSH client used to reach remote deploy hosts
    pub ssh_binary: String,

    /// Webhook receiving one notification per finished run
    pub notify_webhook_url: Option<String>,

    /// Upper bound on one webhook delivery, response included
    pub notify_timeout: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(runner_id: String, orchestrator_url: String) -> Self {
        Self {
            runner_id,
            orchestrator_url,
            poll_interval: Duration::from_secs(5),
            log_send_interval: Duration::from_secs(10),
            cancel_poll_interval: Duration::from_secs(5),
            max_parallel_runs: 2,
            max_parallel_stages: 4,
            stage_timeout: Duration::from_secs(1800),
            workspace_base: std::env::temp_dir().join("rollout"),
            container_cli: "docker".to_string(),
            ssh_binary: "ssh".to_string(),
            notify_webhook_url: None,
            notify_timeout: Duration::from_secs(10),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// `RUNNER_ID` and `ORCHESTRATOR_URL` are required; every other
    /// variable falls back to the value from [`Config::new`]. Durations are
    /// given in seconds.
    pub fn from_env() -> anyhow::Result<Self> {
        let runner_id = std::env::var("RUNNER_ID")
            .map_err(|_| anyhow::anyhow!("RUNNER_ID environment variable not set"))?;

        let orchestrator_url = std::env::var("ORCHESTRATOR_URL")
            .map_err(|_| anyhow::anyhow!("ORCHESTRATOR_URL environment variable not set"))?;

        let defaults = Self::new(runner_id, orchestrator_url);

        Ok(Self {
            poll_interval: env_secs("POLL_INTERVAL").unwrap_or(defaults.poll_interval),
            log_send_interval: env_secs("LOG_SEND_INTERVAL").unwrap_or(defaults.log_send_interval),
            cancel_poll_interval: env_secs("CANCEL_POLL_INTERVAL")
                .unwrap_or(defaults.cancel_poll_interval),
            max_parallel_runs: env_parse("MAX_PARALLEL_RUNS").unwrap_or(defaults.max_parallel_runs),
            max_parallel_stages: env_parse("MAX_PARALLEL_STAGES")
                .unwrap_or(defaults.max_parallel_stages),
            stage_timeout: env_secs("STAGE_TIMEOUT").unwrap_or(defaults.stage_timeout),
            workspace_base: std::env::var("WORKSPACE_BASE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| defaults.workspace_base.clone()),
            container_cli: std::env::var("CONTAINER_CLI")
                .unwrap_or_else(|_| defaults.container_cli.clone()),
            ssh_binary: std::env::var("SSH_BINARY").unwrap_or_else(|_| defaults.ssh_binary.clone()),
            notify_webhook_url: std::env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .filter(|url| !url.trim().is_empty()),
            notify_timeout: env_secs("NOTIFY_TIMEOUT").unwrap_or(defaults.notify_timeout),
            ..defaults
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.runner_id.is_empty() {
            anyhow::bail!("runner_id cannot be empty");
        }

        if !is_http_url(&self.orchestrator_url) {
            anyhow::bail!("orchestrator_url must start with http:// or https://");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.log_send_interval.is_zero() {
            anyhow::bail!("log_send_interval must be greater than 0");
        }

        if self.cancel_poll_interval.is_zero() {
            anyhow::bail!("cancel_poll_interval must be greater than 0");
        }

        if self.max_parallel_runs == 0 || self.max_parallel_stages == 0 {
            anyhow::bail!("parallelism limits must be greater than 0");
        }

        if self.stage_timeout.is_zero() {
            anyhow::bail!("stage_timeout must be greater than 0");
        }

        if self.notify_timeout.is_zero() {
            anyhow::bail!("notify_timeout must be greater than 0");
        }

        if let Some(url) = &self.notify_webhook_url {
            if !is_http_url(url) {
                anyhow::bail!("notify_webhook_url must start with http:// or https://");
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            "http://localhost:8080".to_string(),
        )
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse::<T>().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.stage_timeout, Duration::from_secs(1800));
        assert_eq!(config.container_cli, "docker");
        assert!(config.notify_webhook_url.is_none());
        assert_eq!(config.notify_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.runner_id = String::new();
        assert!(config.validate().is_err());
        config.runner_id = "runner-1".to_string();

        config.orchestrator_url = "not-a-url".to_string();
        assert!(config.validate().is_err());
        config.orchestrator_url = "http://localhost:8080".to_string();

        config.max_parallel_stages = 0;
        assert!(config.validate().is_err());
        config.max_parallel_stages = 1;

        config.notify_webhook_url = Some("hooks.slack.com/x".to_string());
        assert!(config.validate().is_err());
        config.notify_webhook_url = Some("https://hooks.slack.com/x".to_string());

        config.notify_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
        config.notify_timeout = Duration::from_secs(5);

        assert!(config.validate().is_ok());
    }
}
