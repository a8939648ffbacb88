//! Deploy attempt state machine
//!
//! `Idle -> Publishing -> RemoteUpdating -> HealthChecking -> Committed`,
//! with `RollingBack` entered at most once when the remote update or the
//! health check fails. Every attempt appends exactly one record.

use std::sync::Arc;

use rollout_core::domain::artifact::Artifact;
use rollout_core::domain::deployment::{
    DeployPhase, DeploySpec, DeploymentOutcome, DeploymentRecord, HealthOutcome,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::health::{HealthProbe, wait_until_healthy};
use super::locks::EnvironmentLocks;
use super::registry::Registry;
use super::remote::RemoteHost;
use super::store::DeploymentStore;
use crate::error::DeployError;

/// A finished attempt and, unless it committed, why it failed
#[derive(Debug)]
pub struct DeployAttempt {
    pub record: DeploymentRecord,
    pub error: Option<DeployError>,
}

impl DeployAttempt {
    pub fn is_committed(&self) -> bool {
        self.error.is_none()
    }
}

pub struct DeploymentController {
    registry: Arc<dyn Registry>,
    remote: Arc<dyn RemoteHost>,
    probe: Arc<dyn HealthProbe>,
    store: Arc<dyn DeploymentStore>,
    locks: EnvironmentLocks,
}

impl DeploymentController {
    pub fn new(
        registry: Arc<dyn Registry>,
        remote: Arc<dyn RemoteHost>,
        probe: Arc<dyn HealthProbe>,
        store: Arc<dyn DeploymentStore>,
    ) -> Self {
        Self {
            registry,
            remote,
            probe,
            store,
            locks: EnvironmentLocks::new(),
        }
    }

    /// Runs one deploy attempt of `artifact` to `target`
    ///
    /// Attempts on the same environment are serialized for their whole
    /// duration. `Err` means the store could not be read or written, or the
    /// environment is still inconsistent and nothing was attempted; every
    /// other failure is reported through [`DeployAttempt::error`] with the
    /// record already appended.
    pub async fn deploy(
        &self,
        target: &DeploySpec,
        artifact: Artifact,
        run_id: Option<Uuid>,
    ) -> Result<DeployAttempt, DeployError> {
        let _guard = self.locks.acquire(&target.environment).await;

        let current = self.store.current(&target.environment).await?;
        if current.inconsistent {
            warn!(
                "Refusing to deploy {} to {}: environment is inconsistent",
                artifact, target.environment
            );
            return Err(DeployError::InconsistentState {
                environment: target.environment.clone(),
                message: "latest deployment left it in an unknown state; \
                          acknowledge it before deploying again"
                    .to_string(),
            });
        }

        let previous = current.artifact;
        info!(
            "Deploying {} to {} (previous: {})",
            artifact,
            target.environment,
            previous
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "none".to_string())
        );

        let mut attempt = Attempt::new(target, artifact, previous);
        let ending = match self.drive(&mut attempt).await {
            Ok(ending) => ending,
            Err(err) => {
                error!("Deploy to {} aborted: {}", target.environment, err);
                Ending {
                    outcome: DeploymentOutcome::Inconsistent,
                    current: None,
                    error: Some(err),
                }
            }
        };

        let record = attempt.into_record(&ending, run_id);
        self.store.append(&record).await?;

        info!(
            "Deploy of {} to {} finished: {}",
            record.artifact, record.environment, record.outcome
        );
        Ok(DeployAttempt {
            record,
            error: ending.error,
        })
    }

    async fn drive(&self, a: &mut Attempt<'_>) -> Result<Ending, DeployError> {
        a.advance(DeployPhase::Publishing)?;
        if let Err(message) = self.registry.push(&a.artifact).await {
            a.advance(DeployPhase::Failed)?;
            return Ok(Ending::failed(
                a.previous.clone(),
                DeployError::Publish {
                    artifact: a.artifact.to_string(),
                    message,
                },
            ));
        }

        a.advance(DeployPhase::RemoteUpdating)?;
        if let Err(message) = self.swap(a.target, &a.artifact).await {
            return match a.previous.clone() {
                Some(previous) => {
                    let reason = DeployError::RemoteUpdate(message).to_string();
                    self.roll_back(a, previous, reason).await
                }
                None => {
                    a.advance(DeployPhase::Failed)?;
                    Ok(Ending::failed(None, DeployError::RemoteUpdate(message)))
                }
            };
        }

        a.advance(DeployPhase::HealthChecking)?;
        let health = wait_until_healthy(self.probe.as_ref(), &a.target.health).await;
        a.health = health.clone();

        let reason = match health {
            HealthOutcome::Healthy { .. } => {
                a.advance(DeployPhase::Committed)?;
                return Ok(Ending {
                    outcome: DeploymentOutcome::Committed,
                    current: Some(a.artifact.clone()),
                    error: None,
                });
            }
            HealthOutcome::Unhealthy {
                attempts,
                last_error,
            } => DeployError::HealthCheck {
                attempts,
                last_error,
            }
            .to_string(),
            HealthOutcome::NotChecked => "health check did not run".to_string(),
        };

        match a.previous.clone() {
            Some(previous) => self.roll_back(a, previous, reason).await,
            None => self.abandon(a, reason).await,
        }
    }

    /// Pulls first so the target is down only between stop and start
    async fn swap(&self, target: &DeploySpec, artifact: &Artifact) -> Result<(), String> {
        self.remote.pull(target, artifact).await?;
        self.remote.stop(target).await?;
        self.remote.start(target, artifact).await
    }

    async fn roll_back(
        &self,
        a: &mut Attempt<'_>,
        previous: Artifact,
        reason: String,
    ) -> Result<Ending, DeployError> {
        a.advance(DeployPhase::RollingBack)?;
        warn!(
            "Rolling back {} to {}: {}",
            a.target.environment, previous, reason
        );

        if let Err(e) = self.remote.stop(a.target).await {
            warn!("Failed to stop {} before rollback: {}", a.artifact, e);
        }

        if let Err(e) = self.remote.start(a.target, &previous).await {
            return a.inconsistent(format!("{}; restarting {} failed: {}", reason, previous, e));
        }

        let restored = wait_until_healthy(self.probe.as_ref(), &a.target.health).await;
        let healthy = restored.is_healthy();
        a.rollback_health = Some(restored);

        if !healthy {
            return a.inconsistent(format!(
                "{}; previous artifact {} is unhealthy too",
                reason, previous
            ));
        }

        a.advance(DeployPhase::Committed)?;
        Ok(Ending {
            outcome: DeploymentOutcome::RolledBack,
            current: Some(previous.clone()),
            error: Some(DeployError::RolledBack {
                failed: a.artifact.to_string(),
                restored: previous.to_string(),
                reason,
            }),
        })
    }

    /// Unhealthy first deploy: stop it, there is nothing to restore
    async fn abandon(&self, a: &mut Attempt<'_>, reason: String) -> Result<Ending, DeployError> {
        a.advance(DeployPhase::RollingBack)?;
        if let Err(e) = self.remote.stop(a.target).await {
            warn!("Failed to stop {}: {}", a.artifact, e);
        }
        a.inconsistent(format!("{}; no previous artifact to restore", reason))
    }
}

/// How an attempt ended, before it becomes a record
struct Ending {
    outcome: DeploymentOutcome,
    current: Option<Artifact>,
    error: Option<DeployError>,
}

impl Ending {
    fn failed(current: Option<Artifact>, error: DeployError) -> Self {
        Self {
            outcome: DeploymentOutcome::Failed,
            current,
            error: Some(error),
        }
    }
}

/// Mutable state of an attempt in flight
struct Attempt<'a> {
    target: &'a DeploySpec,
    artifact: Artifact,
    previous: Option<Artifact>,
    phase: DeployPhase,
    phases: Vec<DeployPhase>,
    health: HealthOutcome,
    rollback_health: Option<HealthOutcome>,
}

impl<'a> Attempt<'a> {
    fn new(target: &'a DeploySpec, artifact: Artifact, previous: Option<Artifact>) -> Self {
        Self {
            target,
            artifact,
            previous,
            phase: DeployPhase::Idle,
            phases: vec![DeployPhase::Idle],
            health: HealthOutcome::NotChecked,
            rollback_health: None,
        }
    }

    fn advance(&mut self, next: DeployPhase) -> Result<(), DeployError> {
        if !self.phase.can_transition_to(next) {
            return Err(DeployError::IllegalTransition {
                from: self.phase,
                to: next,
            });
        }
        debug!("{}: {} -> {}", self.target.environment, self.phase, next);
        self.phase = next;
        self.phases.push(next);
        Ok(())
    }

    fn inconsistent(&mut self, message: String) -> Result<Ending, DeployError> {
        self.advance(DeployPhase::Inconsistent)?;
        error!(
            "Environment {} is inconsistent: {}",
            self.target.environment, message
        );
        Ok(Ending {
            outcome: DeploymentOutcome::Inconsistent,
            current: None,
            error: Some(DeployError::InconsistentState {
                environment: self.target.environment.clone(),
                message,
            }),
        })
    }

    fn into_record(self, ending: &Ending, run_id: Option<Uuid>) -> DeploymentRecord {
        DeploymentRecord {
            id: Uuid::new_v4(),
            environment: self.target.environment.clone(),
            artifact: self.artifact,
            previous: self.previous,
            current: ending.current.clone(),
            outcome: ending.outcome,
            health: self.health,
            rollback_health: self.rollback_health,
            phases: self.phases,
            error: ending.error.as_ref().map(ToString::to_string),
            run_id,
            recorded_at: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deploy::fakes::{FakeRegistry, FakeTarget, MemoryStore, artifact, target_spec};
    use DeployPhase::*;

    struct Harness {
        target: Arc<FakeTarget>,
        registry: Arc<FakeRegistry>,
        store: Arc<MemoryStore>,
        controller: DeploymentController,
    }

    fn harness() -> Harness {
        let target = Arc::new(FakeTarget::default());
        let registry = Arc::new(FakeRegistry::default());
        let store = Arc::new(MemoryStore::default());
        let controller = DeploymentController::new(
            registry.clone(),
            target.clone(),
            target.clone(),
            store.clone(),
        );
        Harness {
            target,
            registry,
            store,
            controller,
        }
    }

    /// Harness whose environment already runs `live`
    async fn harness_with_live(live: &str) -> Harness {
        let h = harness();
        let attempt = h
            .controller
            .deploy(&target_spec(), artifact(live), None)
            .await
            .unwrap();
        assert!(attempt.is_committed());
        h.target.clear_calls();
        h
    }

    #[tokio::test]
    async fn test_successful_deploy_commits_new_artifact() {
        let h = harness_with_live("v1").await;

        let attempt = h
            .controller
            .deploy(&target_spec(), artifact("v2"), None)
            .await
            .unwrap();

        assert!(attempt.is_committed());
        let record = &attempt.record;
        assert_eq!(record.outcome, DeploymentOutcome::Committed);
        assert_eq!(record.previous, Some(artifact("v1")));
        assert_eq!(record.current, Some(artifact("v2")));
        assert_eq!(
            record.phases,
            [Idle, Publishing, RemoteUpdating, HealthChecking, Committed]
        );
        assert!(record.validate().is_ok());

        let records = h.store.records();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records
                .iter()
                .filter(|r| r.outcome == DeploymentOutcome::Committed
                    && r.artifact == artifact("v2"))
                .count(),
            1
        );
        assert_eq!(h.target.calls(), ["pull v2", "stop", "start v2", "probe"]);
        assert_eq!(
            h.registry.pushed().last().map(String::as_str),
            Some("registry.local/web:v2")
        );
    }

    #[tokio::test]
    async fn test_publish_failure_never_touches_remote() {
        let h = harness_with_live("v1").await;
        h.registry.fail();

        let attempt = h
            .controller
            .deploy(&target_spec(), artifact("v2"), None)
            .await
            .unwrap();

        assert!(matches!(attempt.error, Some(DeployError::Publish { .. })));
        assert_eq!(attempt.record.outcome, DeploymentOutcome::Failed);
        assert_eq!(attempt.record.current, Some(artifact("v1")));
        assert_eq!(attempt.record.phases, [Idle, Publishing, Failed]);
        assert!(h.target.calls().is_empty());
        assert_eq!(h.target.live(), Some("v1".to_string()));
    }

    #[tokio::test]
    async fn test_unhealthy_deploy_rolls_back_once() {
        let h = harness_with_live("v1").await;
        h.target.mark_unhealthy("v2");

        let attempt = h
            .controller
            .deploy(&target_spec(), artifact("v2"), None)
            .await
            .unwrap();

        let record = &attempt.record;
        assert!(matches!(attempt.error, Some(DeployError::RolledBack { .. })));
        assert_eq!(record.outcome, DeploymentOutcome::RolledBack);
        assert_eq!(record.current, Some(artifact("v1")));
        assert_eq!(record.phases.iter().filter(|p| **p == RollingBack).count(), 1);
        assert_eq!(
            record.health,
            HealthOutcome::Unhealthy {
                attempts: 3,
                last_error: "v2 returned 503".to_string()
            }
        );
        assert_eq!(
            record.rollback_health,
            Some(HealthOutcome::Healthy { attempts: 1 })
        );
        assert!(record.validate().is_ok());
        assert_eq!(h.target.live(), Some("v1".to_string()));
        assert_eq!(
            h.store.current("production").await.unwrap().artifact,
            Some(artifact("v1"))
        );
    }

    #[tokio::test]
    async fn test_failed_rollback_is_inconsistent() {
        let h = harness_with_live("v1").await;
        h.target.mark_unhealthy("v1");
        h.target.mark_unhealthy("v2");

        let attempt = h
            .controller
            .deploy(&target_spec(), artifact("v2"), None)
            .await
            .unwrap();

        assert!(matches!(
            attempt.error,
            Some(DeployError::InconsistentState { .. })
        ));
        assert_eq!(attempt.record.outcome, DeploymentOutcome::Inconsistent);
        assert_eq!(attempt.record.current, None);
        assert_eq!(
            attempt.record.phases.last(),
            Some(&Inconsistent)
        );
        assert!(attempt.record.validate().is_ok());

        // Nothing after the failed rollback verification
        let calls = h.target.calls();
        assert_eq!(
            calls,
            [
                "pull v2", "stop", "start v2", "probe", "probe", "probe", "stop", "start v1",
                "probe", "probe", "probe"
            ]
        );
        assert_eq!(h.store.records().len(), 2);
    }

    #[tokio::test]
    async fn test_inconsistent_environment_refuses_deploys_until_acknowledged() {
        let h = harness_with_live("v1").await;
        h.target.mark_unhealthy("v1");
        h.target.mark_unhealthy("v2");
        let attempt = h
            .controller
            .deploy(&target_spec(), artifact("v2"), None)
            .await
            .unwrap();
        assert_eq!(attempt.record.outcome, DeploymentOutcome::Inconsistent);
        h.target.clear_calls();

        let err = h
            .controller
            .deploy(&target_spec(), artifact("v3"), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeployError::InconsistentState { ref environment, .. } if environment == "production"
        ));
        assert!(h.target.calls().is_empty());
        assert_eq!(h.registry.pushed().len(), 2);
        assert_eq!(h.store.records().len(), 2);

        // Operator restored v1 by hand
        let latest = h.store.records().pop().unwrap();
        let ack = DeploymentRecord::acknowledgement(&latest, Some(artifact("v1")), None).unwrap();
        h.store.append(&ack).await.unwrap();

        let attempt = h
            .controller
            .deploy(&target_spec(), artifact("v3"), None)
            .await
            .unwrap();
        assert!(attempt.is_committed());
        assert_eq!(attempt.record.previous, Some(artifact("v1")));
        assert_eq!(h.target.calls()[0], "pull v3");
    }

    #[tokio::test]
    async fn test_remote_failure_with_previous_rolls_back() {
        let h = harness_with_live("v1").await;
        h.target.fail_start("v2");

        let attempt = h
            .controller
            .deploy(&target_spec(), artifact("v2"), None)
            .await
            .unwrap();

        assert_eq!(attempt.record.outcome, DeploymentOutcome::RolledBack);
        assert_eq!(
            attempt.record.phases,
            [Idle, Publishing, RemoteUpdating, RollingBack, Committed]
        );
        assert_eq!(attempt.record.health, HealthOutcome::NotChecked);
        assert_eq!(h.target.live(), Some("v1".to_string()));
    }

    #[tokio::test]
    async fn test_remote_failure_without_previous_fails() {
        let h = harness();
        h.target.fail_start("v1");

        let attempt = h
            .controller
            .deploy(&target_spec(), artifact("v1"), None)
            .await
            .unwrap();

        assert!(matches!(attempt.error, Some(DeployError::RemoteUpdate(_))));
        assert_eq!(attempt.record.outcome, DeploymentOutcome::Failed);
        assert_eq!(attempt.record.current, None);
        assert_eq!(
            attempt.record.phases,
            [Idle, Publishing, RemoteUpdating, Failed]
        );
    }

    #[tokio::test]
    async fn test_unhealthy_first_deploy_is_abandoned() {
        let h = harness();
        h.target.mark_unhealthy("v1");

        let attempt = h
            .controller
            .deploy(&target_spec(), artifact("v1"), None)
            .await
            .unwrap();

        assert_eq!(attempt.record.outcome, DeploymentOutcome::Inconsistent);
        assert_eq!(h.target.live(), None);
        assert!(attempt.record.validate().is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_deploys_to_one_environment_are_serialized() {
        let h = Arc::new(harness());
        let first = {
            let h = h.clone();
            tokio::spawn(async move {
                h.controller
                    .deploy(&target_spec(), artifact("v1"), None)
                    .await
            })
        };
        let second = {
            let h = h.clone();
            tokio::spawn(async move {
                h.controller
                    .deploy(&target_spec(), artifact("v2"), None)
                    .await
            })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let records = h.store.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].previous, None);
        assert_eq!(records[1].previous, Some(records[0].artifact.clone()));
    }
}
