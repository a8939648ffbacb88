//! Deployment record persistence

use std::sync::Arc;

use async_trait::async_trait;
use rollout_client::OrchestratorClient;
use rollout_core::domain::deployment::DeploymentRecord;
use rollout_core::dto::deployment::CurrentDeployment;

use crate::error::DeployError;

/// Append-only history of deploy attempts per environment
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// What is live in `environment`, derived from its latest record
    async fn current(&self, environment: &str) -> Result<CurrentDeployment, DeployError>;

    async fn append(&self, record: &DeploymentRecord) -> Result<(), DeployError>;
}

/// Stores records through the orchestrator API
pub struct OrchestratorDeploymentStore {
    client: Arc<OrchestratorClient>,
}

impl OrchestratorDeploymentStore {
    pub fn new(client: Arc<OrchestratorClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeploymentStore for OrchestratorDeploymentStore {
    async fn current(&self, environment: &str) -> Result<CurrentDeployment, DeployError> {
        Ok(self.client.current_deployment(environment).await?)
    }

    async fn append(&self, record: &DeploymentRecord) -> Result<(), DeployError> {
        Ok(self.client.record_deployment(record).await?)
    }
}
