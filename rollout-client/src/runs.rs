//! Run endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use rollout_core::domain::log::LogEntry;
use rollout_core::domain::run::{Run, RunResult, RunStatus};
use rollout_core::domain::stage::StageResult;
use rollout_core::dto::log::LogBatch;
use rollout_core::dto::run::{ClaimRun, CompleteRun, RunControl, RunExecutionInfo};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Queries
    // =============================================================================

    pub async fn get_run(&self, run_id: Uuid) -> Result<Run> {
        let response = self
            .client
            .get(self.url(&format!("/run/{}", run_id)))
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn list_runs(&self) -> Result<Vec<Run>> {
        let response = self.client.get(self.url("/run/list")).send().await?;
        self.handle_response(response).await
    }

    /// Runs waiting for a runner, oldest first
    pub async fn list_queued_runs(&self) -> Result<Vec<Run>> {
        let response = self.client.get(self.url("/run/list/queued")).send().await?;
        self.handle_response(response).await
    }

    pub async fn list_runs_by_pipeline(&self, pipeline_id: Uuid) -> Result<Vec<Run>> {
        let response = self
            .client
            .get(self.url(&format!("/run/pipeline/{}", pipeline_id)))
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn list_stages(&self, run_id: Uuid) -> Result<Vec<StageResult>> {
        let response = self
            .client
            .get(self.url(&format!("/run/{}/stages", run_id)))
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Request cancellation; queued runs are cancelled immediately, running
    /// runs stop at the next stage boundary
    pub async fn cancel_run(&self, run_id: Uuid) -> Result<Run> {
        let response = self
            .client
            .post(self.url(&format!("/run/{}/cancel", run_id)))
            .send()
            .await?;
        self.handle_response(response).await
    }

    // =============================================================================
    // Execution (runner side)
    // =============================================================================

    /// Claim a queued run; fails with 409 when another runner got it first
    pub async fn claim_run(&self, run_id: Uuid, runner_id: &str) -> Result<RunExecutionInfo> {
        let response = self
            .client
            .post(self.url(&format!("/run/claim/{}", run_id)))
            .json(&ClaimRun {
                runner_id: runner_id.to_string(),
            })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Record a finalized stage result
    pub async fn report_stage(&self, run_id: Uuid, result: &StageResult) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/run/{}/stage", run_id)))
            .json(result)
            .send()
            .await?;
        self.handle_empty_response(response).await
    }

    pub async fn run_control(&self, run_id: Uuid) -> Result<RunControl> {
        let response = self
            .client
            .get(self.url(&format!("/run/{}/control", run_id)))
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn complete_run(
        &self,
        run_id: Uuid,
        status: RunStatus,
        result: RunResult,
    ) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/run/{}/complete", run_id)))
            .json(&CompleteRun {
                status,
                result: Some(result),
            })
            .send()
            .await?;
        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Logs
    // =============================================================================

    pub async fn get_logs(&self, run_id: Uuid) -> Result<Vec<LogEntry>> {
        let response = self
            .client
            .get(self.url(&format!("/run/{}/logs", run_id)))
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Append log entries to a run; an empty batch is not sent
    pub async fn send_logs(&self, run_id: Uuid, entries: Vec<LogEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let response = self
            .client
            .post(self.url(&format!("/run/{}/logs", run_id)))
            .json(&LogBatch { entries })
            .send()
            .await?;
        self.handle_empty_response(response).await
    }
}
