//! Deployment domain types
//!
//! A deploy attempt walks the [`DeployPhase`] state machine and always ends in
//! exactly one appended [`DeploymentRecord`]. The record history of an
//! environment is the only source of truth for what is live there.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::artifact::Artifact;

/// Deploy block attached to a stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploySpec {
    /// Target environment, the unit of deploy serialization
    pub environment: String,
    /// Image repository the artifact is published to
    pub repository: String,
    /// Remote host (`user@host`); `None` targets the local container runtime
    #[serde(default)]
    pub host: Option<String>,
    /// Name of the running instance on the host
    pub container: String,
    #[serde(default)]
    pub port: Option<PortBinding>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub health: HealthCheckPolicy,
}

impl DeploySpec {
    /// Checks the block for values that can never deploy successfully
    pub fn validate(&self) -> Result<(), String> {
        if self.environment.trim().is_empty() {
            return Err("environment must not be empty".to_string());
        }
        if self.repository.trim().is_empty() {
            return Err("repository must not be empty".to_string());
        }
        if self.container.trim().is_empty() {
            return Err("container must not be empty".to_string());
        }
        if let Some(port) = &self.port {
            if port.host == 0 || port.container == 0 {
                return Err("port numbers must be non-zero".to_string());
            }
        }
        self.health.validate()
    }

    pub fn is_local(&self) -> bool {
        self.host.is_none()
    }
}

/// Host to container port mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
}

/// Bounded polling policy for a liveness endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckPolicy {
    pub url: String,
    /// Total number of probe attempts
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Per-attempt timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Required value of the payload's `status` field
    #[serde(default = "default_expected_status")]
    pub expected_status: String,
    #[serde(default)]
    pub backoff: Backoff,
}

fn default_retries() -> u32 {
    3
}

fn default_interval_ms() -> u64 {
    5_000
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_expected_status() -> String {
    "healthy".to_string()
}

impl HealthCheckPolicy {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retries: default_retries(),
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
            expected_status: default_expected_status(),
            backoff: Backoff::Fixed,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(format!("health url '{}' must be http(s)", self.url));
        }
        if self.retries == 0 {
            return Err("health retries must be at least 1".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("health timeout must be positive".to_string());
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay to wait after the failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base = self.interval_ms;
        let millis = match self.backoff {
            Backoff::Fixed => base,
            Backoff::Exponential { max_interval_ms } => {
                let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
                base.saturating_mul(factor).min(max_interval_ms.max(base))
            }
        };
        Duration::from_millis(millis)
    }
}

/// Delay growth between health probe attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    #[default]
    Fixed,
    /// Doubles the interval after every attempt, capped at `max_interval_ms`
    Exponential { max_interval_ms: u64 },
}

/// States of one deploy attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeployPhase {
    Idle,
    Publishing,
    RemoteUpdating,
    HealthChecking,
    RollingBack,
    Committed,
    Failed,
    Inconsistent,
}

impl DeployPhase {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: DeployPhase) -> bool {
        use DeployPhase::*;
        matches!(
            (self, next),
            (Idle, Publishing)
                | (Publishing, RemoteUpdating)
                | (Publishing, Failed)
                | (RemoteUpdating, HealthChecking)
                | (RemoteUpdating, RollingBack)
                | (RemoteUpdating, Failed)
                | (HealthChecking, Committed)
                | (HealthChecking, RollingBack)
                | (RollingBack, Committed)
                | (RollingBack, Inconsistent)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeployPhase::Committed | DeployPhase::Failed | DeployPhase::Inconsistent
        )
    }
}

impl std::fmt::Display for DeployPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// How a deploy attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentOutcome {
    /// New artifact is live and healthy
    Committed,
    /// New artifact failed, previous artifact restored and healthy
    RolledBack,
    /// Attempt failed before or without touching a previous artifact
    Failed,
    /// Rollback target also failed; operator required
    Inconsistent,
    /// Operator declared what is live after an inconsistent attempt
    Acknowledged,
}

impl DeploymentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentOutcome::Committed => "Committed",
            DeploymentOutcome::RolledBack => "RolledBack",
            DeploymentOutcome::Failed => "Failed",
            DeploymentOutcome::Inconsistent => "Inconsistent",
            DeploymentOutcome::Acknowledged => "Acknowledged",
        }
    }
}

impl std::fmt::Display for DeploymentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum HealthOutcome {
    NotChecked,
    Healthy { attempts: u32 },
    Unhealthy { attempts: u32, last_error: String },
}

impl HealthOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthOutcome::Healthy { .. })
    }
}

/// Audit entry for one deploy attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: Uuid,
    pub environment: String,
    /// Artifact this attempt tried to deploy
    pub artifact: Artifact,
    /// What was live when the attempt took the environment lock
    pub previous: Option<Artifact>,
    /// What is live after the attempt; `None` when unknown
    pub current: Option<Artifact>,
    pub outcome: DeploymentOutcome,
    pub health: HealthOutcome,
    pub rollback_health: Option<HealthOutcome>,
    /// Every phase visited, starting at `Idle`
    pub phases: Vec<DeployPhase>,
    pub error: Option<String>,
    pub run_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
}

impl DeploymentRecord {
    /// Checks that `current` agrees with `outcome`
    pub fn validate(&self) -> Result<(), String> {
        let consistent = match self.outcome {
            DeploymentOutcome::Committed => self.current.as_ref() == Some(&self.artifact),
            DeploymentOutcome::RolledBack => {
                self.previous.is_some() && self.current == self.previous
            }
            DeploymentOutcome::Failed => self.current == self.previous,
            DeploymentOutcome::Inconsistent => self.current.is_none(),
            DeploymentOutcome::Acknowledged => self.phases == [DeployPhase::Idle],
        };
        if !consistent {
            return Err(format!(
                "{} record has an inconsistent current artifact",
                self.outcome
            ));
        }
        if self.environment.trim().is_empty() {
            return Err("environment must not be empty".to_string());
        }
        for pair in self.phases.windows(2) {
            if !pair[0].can_transition_to(pair[1]) {
                return Err(format!(
                    "illegal phase transition {} -> {}",
                    pair[0], pair[1]
                ));
            }
        }
        Ok(())
    }

    /// Builds the record an operator appends to clear an inconsistent environment
    ///
    /// `live` is what the operator verified is running now, `None` if nothing.
    /// Fails unless `latest` is an Inconsistent record.
    pub fn acknowledgement(
        latest: &DeploymentRecord,
        live: Option<Artifact>,
        note: Option<String>,
    ) -> Result<Self, String> {
        if latest.outcome != DeploymentOutcome::Inconsistent {
            return Err(format!(
                "{} is not inconsistent (latest outcome: {})",
                latest.environment, latest.outcome
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            environment: latest.environment.clone(),
            artifact: latest.artifact.clone(),
            previous: None,
            current: live,
            outcome: DeploymentOutcome::Acknowledged,
            health: HealthOutcome::NotChecked,
            rollback_health: None,
            phases: vec![DeployPhase::Idle],
            error: note,
            run_id: None,
            recorded_at: Utc::now(),
        })
    }
}

/// Derives the live artifact of an environment from its history (oldest first)
///
/// Returns `None` when nothing was ever deployed or when the latest attempt
/// left the environment inconsistent.
pub fn current_artifact(history: &[DeploymentRecord]) -> Option<&Artifact> {
    history.last().and_then(|record| record.current.as_ref())
}
