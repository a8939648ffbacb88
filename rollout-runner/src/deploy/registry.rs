//! Artifact publishing

use async_trait::async_trait;
use rollout_core::domain::artifact::Artifact;
use tracing::info;

use super::cli;

/// Destination for built artifacts
#[async_trait]
pub trait Registry: Send + Sync {
    /// Publishes `artifact` and returns the reference hosts pull from
    async fn push(&self, artifact: &Artifact) -> Result<String, String>;
}

/// Pushes images with a container CLI (`docker` or `podman`)
///
/// The image must already be built and tagged `repository:id` by an
/// earlier stage.
pub struct ContainerRegistry {
    cli: String,
}

impl ContainerRegistry {
    pub fn new(cli: impl Into<String>) -> Self {
        Self { cli: cli.into() }
    }
}

#[async_trait]
impl Registry for ContainerRegistry {
    async fn push(&self, artifact: &Artifact) -> Result<String, String> {
        let reference = artifact.reference();
        info!("Pushing {}", reference);
        cli::run(&self.cli, &["push".to_string(), reference.clone()]).await?;
        Ok(reference)
    }
}
