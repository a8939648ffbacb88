//! Deployment record endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use rollout_core::domain::deployment::DeploymentRecord;
use rollout_core::dto::deployment::{AcknowledgeDeployment, CurrentDeployment};

impl OrchestratorClient {
    /// Append a deployment record to its environment's history
    pub async fn record_deployment(&self, record: &DeploymentRecord) -> Result<()> {
        let response = self
            .client
            .post(self.url("/deployment"))
            .json(record)
            .send()
            .await?;
        self.handle_empty_response(response).await
    }

    /// Every recorded attempt for `environment`, oldest first
    pub async fn deployment_history(&self, environment: &str) -> Result<Vec<DeploymentRecord>> {
        let response = self
            .client
            .get(self.url(&format!("/deployment/{}", environment)))
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn current_deployment(&self, environment: &str) -> Result<CurrentDeployment> {
        let response = self
            .client
            .get(self.url(&format!("/deployment/{}/current", environment)))
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Clear an inconsistent environment, declaring what is actually live
    pub async fn acknowledge_deployment(
        &self,
        environment: &str,
        req: &AcknowledgeDeployment,
    ) -> Result<DeploymentRecord> {
        let response = self
            .client
            .post(self.url(&format!("/deployment/{}/acknowledge", environment)))
            .json(req)
            .send()
            .await?;
        self.handle_response(response).await
    }
}
