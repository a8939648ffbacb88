//! Run notifications
//!
//! One message per finished run, posted to a chat-style incoming webhook.
//! Delivery is best effort: a failed or slow notification is logged and
//! never changes the run's outcome.

use std::time::Duration;

use async_trait::async_trait;
use rollout_core::dto::notification::NotificationPayload;
use tracing::{info, warn};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, payload: &NotificationPayload);
}

/// Posts notifications as JSON to a webhook URL
///
/// Without a URL the notification is only written to the runner's log.
/// A delivery that takes longer than `timeout` is abandoned.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Option<String>,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(client: reqwest::Client, url: Option<String>, timeout: Duration) -> Self {
        Self {
            client,
            url,
            timeout,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, payload: &NotificationPayload) {
        let Some(url) = &self.url else {
            info!("Notification: {}", payload.text);
            return;
        };

        let request = self.client.post(url).timeout(self.timeout).json(payload);
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                info!("Notified run {} ({:?})", payload.run_id, payload.status);
            }
            Ok(response) => {
                warn!(
                    "Notification webhook rejected run {}: {}",
                    payload.run_id,
                    response.status()
                );
            }
            Err(e) => {
                warn!("Failed to deliver notification for run {}: {}", payload.run_id, e);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rollout_core::dto::notification::NotificationStatus;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn payload() -> NotificationPayload {
        NotificationPayload::new(
            NotificationStatus::Failed,
            "web",
            Uuid::new_v4(),
            Some("3f2a9c1".to_string()),
            "alice",
            "main",
            Some("stage 'test' failed".to_string()),
        )
    }

    #[tokio::test]
    async fn test_posts_payload_to_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "status": "Failed",
                "pipeline": "web",
                "artifact_id": "3f2a9c1",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(
            reqwest::Client::new(),
            Some(format!("{}/hook", server.uri())),
            TIMEOUT,
        );
        notifier.notify(&payload()).await;
    }

    #[tokio::test]
    async fn test_rejected_notification_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(reqwest::Client::new(), Some(server.uri()), TIMEOUT);
        notifier.notify(&payload()).await;
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_swallowed() {
        let notifier = WebhookNotifier::new(
            reqwest::Client::new(),
            Some("http://127.0.0.1:9/hook".to_string()),
            TIMEOUT,
        );
        notifier.notify(&payload()).await;
    }

    #[tokio::test]
    async fn test_slow_webhook_is_abandoned_after_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(
            reqwest::Client::new(),
            Some(server.uri()),
            Duration::from_millis(200),
        );
        let delivered =
            tokio::time::timeout(Duration::from_secs(3), notifier.notify(&payload())).await;
        assert!(delivered.is_ok(), "notify blocked past its timeout");
    }
}
