//! Pipeline endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use rollout_core::domain::pipeline::Pipeline;
use rollout_core::domain::run::Run;
use rollout_core::dto::pipeline::CreatePipeline;
use rollout_core::dto::run::TriggerRun;
use uuid::Uuid;

impl OrchestratorClient {
    /// Upload a pipeline definition; the orchestrator validates it first
    ///
    /// # Example
    /// ```no_run
    /// # use rollout_client::OrchestratorClient;
    /// # use rollout_core::dto::pipeline::CreatePipeline;
    /// # async fn example() -> rollout_client::Result<()> {
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// let pipeline = client.create_pipeline(CreatePipeline {
    ///     script: std::fs::read_to_string("pipeline.lua").unwrap(),
    ///     tags: vec!["web".to_string()],
    ///     config: None,
    /// }).await?;
    /// println!("{}", pipeline.id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_pipeline(&self, req: CreatePipeline) -> Result<Pipeline> {
        let response = self
            .client
            .post(self.url("/pipeline/create"))
            .json(&req)
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn list_pipelines(&self) -> Result<Vec<Pipeline>> {
        let response = self.client.get(self.url("/pipeline/list")).send().await?;
        self.handle_response(response).await
    }

    pub async fn get_pipeline(&self, pipeline_id: Uuid) -> Result<Pipeline> {
        let response = self
            .client
            .get(self.url(&format!("/pipeline/{}", pipeline_id)))
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn delete_pipeline(&self, pipeline_id: Uuid) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/pipeline/{}", pipeline_id)))
            .send()
            .await?;
        self.handle_empty_response(response).await
    }

    /// Queue a run of a pipeline for the given trigger
    pub async fn trigger_run(&self, req: TriggerRun) -> Result<Run> {
        let response = self
            .client
            .post(self.url("/pipeline/trigger"))
            .json(&req)
            .send()
            .await?;
        self.handle_response(response).await
    }
}
