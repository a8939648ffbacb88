//! Health verification
//!
//! A target is healthy when its health endpoint answers 2xx with a JSON
//! body whose `status` matches the expected value, ignoring case.

use async_trait::async_trait;
use rollout_core::domain::deployment::{HealthCheckPolicy, HealthOutcome};
use tracing::{debug, info, warn};

/// One health probe attempt against a deploy target
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, policy: &HealthCheckPolicy) -> Result<(), String>;
}

/// Probes the policy's URL over HTTP
#[derive(Debug, Clone, Default)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
}

impl HttpHealthProbe {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, policy: &HealthCheckPolicy) -> Result<(), String> {
        let response = self
            .client
            .get(&policy.url)
            .timeout(policy.timeout())
            .send()
            .await
            .map_err(|e| format!("request to {} failed: {}", policy.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("{} returned {}", policy.url, status));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("{} returned an invalid body: {}", policy.url, e))?;

        match body.get("status").and_then(|s| s.as_str()) {
            Some(reported) if reported.eq_ignore_ascii_case(&policy.expected_status) => Ok(()),
            Some(reported) => Err(format!(
                "{} reported status '{}', expected '{}'",
                policy.url, reported, policy.expected_status
            )),
            None => Err(format!("{} body has no status field", policy.url)),
        }
    }
}

/// Probes until healthy or `policy.retries` attempts are used up
///
/// Each attempt is bounded by the policy timeout. There is no delay after
/// the final attempt.
pub async fn wait_until_healthy(probe: &dyn HealthProbe, policy: &HealthCheckPolicy) -> HealthOutcome {
    let mut last_error = String::new();

    for attempt in 1..=policy.retries {
        let result = match tokio::time::timeout(policy.timeout(), probe.probe(policy)).await {
            Ok(result) => result,
            Err(_) => Err(format!("timed out after {}ms", policy.timeout_ms)),
        };

        match result {
            Ok(()) => {
                info!("{} healthy after {} attempt(s)", policy.url, attempt);
                return HealthOutcome::Healthy { attempts: attempt };
            }
            Err(e) => {
                debug!("Health attempt {}/{} failed: {}", attempt, policy.retries, e);
                last_error = e;
            }
        }

        if attempt < policy.retries {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }

    warn!(
        "{} unhealthy after {} attempt(s): {}",
        policy.url, policy.retries, last_error
    );
    HealthOutcome::Unhealthy {
        attempts: policy.retries,
        last_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn policy(url: String) -> HealthCheckPolicy {
        HealthCheckPolicy {
            retries: 3,
            interval_ms: 1,
            timeout_ms: 500,
            ..HealthCheckPolicy::new(url)
        }
    }

    async fn server_with(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_probe_accepts_expected_status_ignoring_case() {
        let server = server_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "Healthy" })),
        )
        .await;
        let probe = HttpHealthProbe::default();
        assert!(probe.probe(&policy(format!("{}/health", server.uri()))).await.is_ok());
    }

    #[tokio::test]
    async fn test_probe_rejects_non_success_status() {
        let server = server_with(
            ResponseTemplate::new(503).set_body_json(serde_json::json!({ "status": "healthy" })),
        )
        .await;
        let err = HttpHealthProbe::default()
            .probe(&policy(format!("{}/health", server.uri())))
            .await
            .unwrap_err();
        assert!(err.contains("503"));
    }

    #[tokio::test]
    async fn test_probe_rejects_unexpected_body() {
        let server = server_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "starting" })),
        )
        .await;
        let err = HttpHealthProbe::default()
            .probe(&policy(format!("{}/health", server.uri())))
            .await
            .unwrap_err();
        assert!(err.contains("starting"));

        let server = server_with(ResponseTemplate::new(200).set_body_string("OK")).await;
        assert!(
            HttpHealthProbe::default()
                .probe(&policy(format!("{}/health", server.uri())))
                .await
                .is_err()
        );
    }

    struct CountingProbe {
        calls: AtomicU32,
        healthy_from: u32,
    }

    #[async_trait]
    impl HealthProbe for CountingProbe {
        async fn probe(&self, _policy: &HealthCheckPolicy) -> Result<(), String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.healthy_from {
                Ok(())
            } else {
                Err(format!("attempt {} refused", call))
            }
        }
    }

    #[tokio::test]
    async fn test_wait_until_healthy_retries_until_success() {
        let probe = CountingProbe {
            calls: AtomicU32::new(0),
            healthy_from: 2,
        };
        let outcome = wait_until_healthy(&probe, &policy("http://app/health".into())).await;
        assert_eq!(outcome, HealthOutcome::Healthy { attempts: 2 });
    }

    #[tokio::test]
    async fn test_wait_until_healthy_stops_after_retries() {
        let probe = CountingProbe {
            calls: AtomicU32::new(0),
            healthy_from: u32::MAX,
        };
        let outcome = wait_until_healthy(&probe, &policy("http://app/health".into())).await;
        assert_eq!(
            outcome,
            HealthOutcome::Unhealthy {
                attempts: 3,
                last_error: "attempt 3 refused".to_string()
            }
        );
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    }

    struct HangingProbe;

    #[async_trait]
    impl HealthProbe for HangingProbe {
        async fn probe(&self, _policy: &HealthCheckPolicy) -> Result<(), String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_attempt_timeout_counts_as_failure() {
        let policy = HealthCheckPolicy {
            retries: 1,
            timeout_ms: 20,
            ..HealthCheckPolicy::new("http://app/health")
        };
        let outcome = wait_until_healthy(&HangingProbe, &policy).await;
        assert!(matches!(
            outcome,
            HealthOutcome::Unhealthy { attempts: 1, ref last_error } if last_error.contains("timed out")
        ));
    }
}
