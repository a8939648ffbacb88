//! Remote host control
//!
//! Swaps the running container on a deploy target. Targets are either the
//! runner's own host or a host reached over `ssh`, in which case the
//! container command line is shell-quoted into a single remote command.

use async_trait::async_trait;
use rollout_core::domain::artifact::Artifact;
use rollout_core::domain::deployment::DeploySpec;
use tracing::{debug, info};

use super::cli::{self, shell_quote};

/// Operations the controller performs on a deploy target
#[async_trait]
pub trait RemoteHost: Send + Sync {
    /// Fetches the artifact onto the target
    async fn pull(&self, target: &DeploySpec, artifact: &Artifact) -> Result<(), String>;

    /// Stops and removes the target's container; succeeds if none exists
    async fn stop(&self, target: &DeploySpec) -> Result<(), String>;

    /// Starts `artifact` as the target's container
    async fn start(&self, target: &DeploySpec, artifact: &Artifact) -> Result<(), String>;
}

/// [`RemoteHost`] driving a container CLI, locally or over ssh
pub struct ContainerHost {
    cli: String,
    ssh: String,
}

impl ContainerHost {
    pub fn new(cli: impl Into<String>, ssh: impl Into<String>) -> Self {
        Self {
            cli: cli.into(),
            ssh: ssh.into(),
        }
    }

    /// Program and arguments that run `cli args...` on the target
    fn invocation(&self, target: &DeploySpec, args: Vec<String>) -> (String, Vec<String>) {
        match &target.host {
            None => (self.cli.clone(), args),
            Some(host) => {
                let remote_command = std::iter::once(self.cli.as_str())
                    .chain(args.iter().map(String::as_str))
                    .map(shell_quote)
                    .collect::<Vec<_>>()
                    .join(" ");
                (
                    self.ssh.clone(),
                    vec![
                        "-o".to_string(),
                        "BatchMode=yes".to_string(),
                        host.clone(),
                        "--".to_string(),
                        remote_command,
                    ],
                )
            }
        }
    }

    async fn exec(&self, target: &DeploySpec, args: Vec<String>) -> Result<String, String> {
        let (program, args) = self.invocation(target, args);
        cli::run(&program, &args).await
    }
}

fn start_args(target: &DeploySpec, artifact: &Artifact) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        target.container.clone(),
    ];
    if let Some(port) = &target.port {
        args.push("-p".to_string());
        args.push(format!("{}:{}", port.host, port.container));
    }

    let mut env: Vec<_> = target.env.iter().collect();
    env.sort();
    for (key, value) in env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }

    args.push(artifact.reference());
    args
}

#[async_trait]
impl RemoteHost for ContainerHost {
    async fn pull(&self, target: &DeploySpec, artifact: &Artifact) -> Result<(), String> {
        info!("Pulling {} on {}", artifact, target.environment);
        self.exec(target, vec!["pull".to_string(), artifact.reference()])
            .await
            .map(drop)
    }

    async fn stop(&self, target: &DeploySpec) -> Result<(), String> {
        info!("Stopping {} on {}", target.container, target.environment);
        let args = vec!["rm".to_string(), "-f".to_string(), target.container.clone()];
        match self.exec(target, args).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_lowercase().contains("no such container") => {
                debug!("No running container {}", target.container);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn start(&self, target: &DeploySpec, artifact: &Artifact) -> Result<(), String> {
        info!("Starting {} on {}", artifact, target.environment);
        self.exec(target, start_args(target, artifact)).await.map(drop)
    }
}
