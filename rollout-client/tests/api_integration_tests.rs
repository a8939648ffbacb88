//! Client behaviour against a mocked orchestrator

use rollout_client::{ClientError, OrchestratorClient};
use rollout_core::domain::artifact::{Artifact, ArtifactId};
use rollout_core::domain::deployment::{DeploymentOutcome, DeploymentRecord};
use rollout_core::domain::log::{LogEntry, LogLevel};
use rollout_core::domain::run::{RunResult, RunStatus};
use rollout_core::dto::deployment::AcknowledgeDeployment;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn run_json(id: Uuid, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "pipeline_id": Uuid::new_v4(),
        "status": status,
        "trigger": { "commit": "abc123", "branch": "main", "actor": "dana" },
        "requested_at": "2026-01-01T00:00:00Z",
        "started_at": null,
        "completed_at": null,
        "runner_id": null,
        "cancel_requested": false,
        "result": null
    })
}

#[tokio::test]
async fn test_list_queued_runs() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/run/list/queued"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([run_json(id, "Queued")])))
        .mount(&server)
        .await;

    let client = OrchestratorClient::new(server.uri());
    let runs = client.list_queued_runs().await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, id);
    assert_eq!(runs[0].status, RunStatus::Queued);
    assert_eq!(runs[0].trigger.branch, "main");
}

#[tokio::test]
async fn test_claim_conflict_is_reported() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path(format!("/run/claim/{}", id)))
        .and(body_partial_json(json!({ "runner_id": "runner-1" })))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({ "error": "Run is not queued" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = OrchestratorClient::new(server.uri());
    let err = client.claim_run(id, "runner-1").await.unwrap_err();
    assert!(err.is_conflict());
    match err {
        ClientError::ApiError { status, message } => {
            assert_eq!(status, 409);
            assert_eq!(message, "Run is not queued");
        }
        other => panic!("expected API error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_complete_run_sends_status_and_result() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path(format!("/run/{}/complete", id)))
        .and(body_partial_json(json!({
            "status": "Failed",
            "result": { "success": false, "error_message": "stage 'test' failed" }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = OrchestratorClient::new(server.uri());
    client
        .complete_run(
            id,
            RunStatus::Failed,
            RunResult {
                success: false,
                error_message: Some("stage 'test' failed".to_string()),
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_send_logs_skips_empty_batches() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path(format!("/run/{}/logs", id)))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = OrchestratorClient::new(server.uri());
    client.send_logs(id, Vec::new()).await.unwrap();
    client
        .send_logs(id, vec![LogEntry::now(LogLevel::Info, "stage 'test' started")])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_current_deployment_parses_pointer() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/deployment/production/current"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "environment": "production",
            "artifact": { "id": "abc123", "repository": "registry.example.com/app" },
            "inconsistent": false,
            "record_id": Uuid::new_v4()
        })))
        .mount(&server)
        .await;

    let client = OrchestratorClient::new(server.uri());
    let current = client.current_deployment("production").await.unwrap();
    let artifact = current.artifact.unwrap();
    assert_eq!(artifact.reference(), "registry.example.com/app:abc123");
    assert!(!current.inconsistent);
}

#[tokio::test]
async fn test_acknowledge_deployment_declares_live_artifact() {
    let server = MockServer::start().await;

    let live = Artifact::new(ArtifactId::parse("abc123").unwrap(), "registry.example.com/app");
    let inconsistent: DeploymentRecord = serde_json::from_value(json!({
        "id": Uuid::new_v4(),
        "environment": "production",
        "artifact": { "id": "def456", "repository": "registry.example.com/app" },
        "previous": { "id": "abc123", "repository": "registry.example.com/app" },
        "current": null,
        "outcome": "Inconsistent",
        "health": { "result": "not_checked" },
        "rollback_health": null,
        "phases": ["Idle"],
        "error": null,
        "run_id": null,
        "recorded_at": "2026-01-01T00:00:00Z"
    }))
    .unwrap();
    let acknowledged = DeploymentRecord::acknowledgement(
        &inconsistent,
        Some(live.clone()),
        Some("restarted by hand".to_string()),
    )
    .unwrap();

    Mock::given(method("POST"))
        .and(path("/deployment/production/acknowledge"))
        .and(body_partial_json(json!({
            "live": { "id": "abc123" },
            "note": "restarted by hand"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(&acknowledged))
        .expect(1)
        .mount(&server)
        .await;

    let client = OrchestratorClient::new(server.uri());
    let record = client
        .acknowledge_deployment(
            "production",
            &AcknowledgeDeployment {
                live: Some(live.clone()),
                note: Some("restarted by hand".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(record.outcome, DeploymentOutcome::Acknowledged);
    assert_eq!(record.current, Some(live));
}

#[tokio::test]
async fn test_acknowledging_consistent_environment_is_conflict() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/deployment/staging/acknowledge"))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({ "error": "staging is not inconsistent" })),
        )
        .mount(&server)
        .await;

    let client = OrchestratorClient::new(server.uri());
    let err = client
        .acknowledge_deployment(
            "staging",
            &AcknowledgeDeployment {
                live: None,
                note: None,
            },
        )
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_invalid_json_is_parse_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/run/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = OrchestratorClient::new(server.uri());
    let err = client.list_runs().await.unwrap_err();
    assert!(matches!(err, ClientError::ParseError(_)));
}

#[tokio::test]
async fn test_unreachable_orchestrator_is_request_failure() {
    let client = OrchestratorClient::new("http://127.0.0.1:9");
    let err = client.list_pipelines().await.unwrap_err();
    assert!(matches!(err, ClientError::RequestFailed(_)));
}

#[tokio::test]
async fn test_health_reports_unavailable_orchestrator() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503).set_body_string("starting"))
        .mount(&server)
        .await;

    let client = OrchestratorClient::new(server.uri());
    let err = client.health().await.unwrap_err();
    assert_eq!(err.status(), Some(503));
}
