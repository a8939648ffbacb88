//! Scripted deploy collaborators for tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rollout_core::domain::artifact::{Artifact, ArtifactId};
use rollout_core::domain::deployment::{DeploySpec, DeploymentRecord, HealthCheckPolicy};
use rollout_core::dto::deployment::CurrentDeployment;

use super::{DeploymentStore, HealthProbe, Registry, RemoteHost};
use crate::error::DeployError;

pub(crate) const REPOSITORY: &str = "registry.local/web";

pub(crate) fn artifact(id: &str) -> Artifact {
    Artifact::new(ArtifactId::parse(id).unwrap(), REPOSITORY)
}

pub(crate) fn target_spec() -> DeploySpec {
    DeploySpec {
        environment: "production".to_string(),
        repository: REPOSITORY.to_string(),
        host: None,
        container: "web".to_string(),
        port: None,
        env: HashMap::new(),
        health: HealthCheckPolicy {
            retries: 3,
            interval_ms: 1,
            timeout_ms: 200,
            ..HealthCheckPolicy::new("http://localhost:8080/health")
        },
    }
}

/// A deploy target that is both the remote host and its health endpoint
///
/// The probe is healthy while the live artifact is not marked unhealthy.
#[derive(Default)]
pub(crate) struct FakeTarget {
    live: Mutex<Option<String>>,
    unhealthy: Mutex<HashSet<String>>,
    failing_starts: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeTarget {
    pub(crate) fn mark_unhealthy(&self, id: &str) {
        self.unhealthy.lock().unwrap().insert(id.to_string());
    }

    pub(crate) fn fail_start(&self, id: &str) {
        self.failing_starts.lock().unwrap().insert(id.to_string());
    }

    pub(crate) fn live(&self) -> Option<String> {
        self.live.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl RemoteHost for FakeTarget {
    async fn pull(&self, _target: &DeploySpec, artifact: &Artifact) -> Result<(), String> {
        self.record(format!("pull {}", artifact.id));
        Ok(())
    }

    async fn stop(&self, _target: &DeploySpec) -> Result<(), String> {
        self.record("stop".to_string());
        *self.live.lock().unwrap() = None;
        Ok(())
    }

    async fn start(&self, _target: &DeploySpec, artifact: &Artifact) -> Result<(), String> {
        let id = artifact.id.to_string();
        self.record(format!("start {}", id));
        if self.failing_starts.lock().unwrap().contains(&id) {
            return Err(format!("container for {} exited immediately", id));
        }
        *self.live.lock().unwrap() = Some(id);
        Ok(())
    }
}

#[async_trait]
impl HealthProbe for FakeTarget {
    async fn probe(&self, _policy: &HealthCheckPolicy) -> Result<(), String> {
        self.record("probe".to_string());
        match self.live() {
            Some(id) if self.unhealthy.lock().unwrap().contains(&id) => {
                Err(format!("{} returned 503", id))
            }
            Some(_) => Ok(()),
            None => Err("connection refused".to_string()),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeRegistry {
    failing: AtomicBool,
    pushed: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub(crate) fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub(crate) fn pushed(&self) -> Vec<String> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Registry for FakeRegistry {
    async fn push(&self, artifact: &Artifact) -> Result<String, String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("registry unreachable".to_string());
        }
        self.pushed.lock().unwrap().push(artifact.reference());
        Ok(artifact.reference())
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    records: Mutex<Vec<DeploymentRecord>>,
}

impl MemoryStore {
    pub(crate) fn records(&self) -> Vec<DeploymentRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn current(&self, environment: &str) -> Result<CurrentDeployment, DeployError> {
        let history: Vec<_> = self
            .records()
            .into_iter()
            .filter(|r| r.environment == environment)
            .collect();
        Ok(CurrentDeployment::from_history(environment, &history))
    }

    async fn append(&self, record: &DeploymentRecord) -> Result<(), DeployError> {
        record.validate().map_err(DeployError::Store)?;
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
