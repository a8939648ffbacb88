//! Per-environment serialization of deploy attempts

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async lock per environment name
///
/// Locks are process-local: two runners deploying the same environment
/// are not serialized against each other.
#[derive(Debug, Default)]
pub struct EnvironmentLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl EnvironmentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `environment`
    pub async fn acquire(&self, environment: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(environment.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_environment_is_exclusive() {
        let locks = EnvironmentLocks::new();
        let guard = locks.acquire("production").await;

        let blocked =
            tokio::time::timeout(Duration::from_millis(20), locks.acquire("production")).await;
        assert!(blocked.is_err());

        drop(guard);
        let _again = locks.acquire("production").await;
    }

    #[tokio::test]
    async fn test_environments_are_independent() {
        let locks = EnvironmentLocks::new();
        let _production = locks.acquire("production").await;
        let staging =
            tokio::time::timeout(Duration::from_millis(20), locks.acquire("staging")).await;
        assert!(staging.is_ok());
    }
}
