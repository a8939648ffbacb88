//! Rollout HTTP Client
//!
//! Typed client for the orchestrator API, shared by the CLI and the runner.
//!
//! # Example
//!
//! ```no_run
//! use rollout_client::OrchestratorClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rollout_client::ClientError> {
//!     let client = OrchestratorClient::new("http://localhost:8080");
//!     for run in client.list_queued_runs().await? {
//!         println!("{} {}", run.id, run.trigger.commit);
//!     }
//!     Ok(())
//! }
//! ```

mod deployments;
pub mod error;
mod pipelines;
mod runs;

pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the orchestrator API
///
/// Endpoints are grouped by resource:
/// - pipelines: create, list, get, delete, trigger
/// - runs: lifecycle, stage reports, control flags, logs
/// - deployments: record history and the current pointer
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    base_url: String,
    client: Client,
}

impl OrchestratorClient {
    /// Create a client for the orchestrator at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a client with a preconfigured `reqwest` client (timeouts, TLS)
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check that the orchestrator is up
    pub async fn health(&self) -> Result<()> {
        let response = self.client.get(self.url("/health")).send().await?;
        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status and deserialize a JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Check the status of a response whose body is ignored
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        Self::check_status(response).await.map(|_| ())
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        tracing::debug!("{} answered {}", response.url(), status);
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(ClientError::api_error(status.as_u16(), body))
    }
}
