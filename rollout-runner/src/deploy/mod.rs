//! Deployment controller and its collaborators
//!
//! The controller drives one deploy attempt through publish, remote
//! update, health verification and at most one rollback. Registry, remote
//! host, health probe and record store sit behind traits so the state
//! machine can run against scripted fakes.

mod cli;
mod controller;
mod health;
mod locks;
mod registry;
mod remote;
mod store;

#[cfg(test)]
pub(crate) mod fakes;

pub use controller::{DeployAttempt, DeploymentController};
pub use health::{HealthProbe, HttpHealthProbe, wait_until_healthy};
pub use locks::EnvironmentLocks;
pub use registry::{ContainerRegistry, Registry};
pub use remote::{ContainerHost, RemoteHost};
pub use store::{DeploymentStore, OrchestratorDeploymentStore};
