use super::*;

use crate::routes::test_support::{get, post, send};
use crate::services::simulate::Simulator;
use crate::state::test_helpers;

#[test]
fn error_mapping() {
    assert_eq!(api_key_error_to_status(&ApiKeyError::Duplicate(Uuid::nil())), StatusCode::CONFLICT);
    assert_eq!(webhook_error_to_status(&WebhookError::InvalidUrl("ftp://x".into())), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(workflow_error_to_status(&WorkflowError::NotFound(Uuid::nil())), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn api_key_never_echoes_secret() {
    let state = test_helpers::test_app_state();
    let secret = "sk_live_abcdef123456";
    let (status, key) = post(&state, "/api/api-keys", json!({"name": "Payments", "service": "stripe", "secret": secret})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(!key.to_string().contains(secret));
    assert!(key["masked_key"].as_str().unwrap().ends_with("3456"));

    let (status, _) = post(&state, "/api/api-keys", json!({"name": "Again", "service": "stripe", "secret": secret})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let id = key["id"].as_str().unwrap();
    let (status, result) = send(&state, "POST", &format!("/api/api-keys/{id}/test"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["success"], true);

    let (_, key) = get(&state, &format!("/api/api-keys/{id}")).await;
    assert_eq!(key["last_test_ok"], true);
}

#[tokio::test]
async fn webhook_routes_validate_and_test() {
    let state = test_helpers::test_app_state();
    let (status, events) = get(&state, "/api/webhooks/events").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events.as_array().unwrap().len(), EVENT_CATALOG.len());

    let (status, body) =
        post(&state, "/api/webhooks", json!({"name": "Bad", "url": "https://hooks.example.com", "events": ["nope"]})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "E_UNKNOWN_EVENT");

    let (status, hook) = post(
        &state,
        "/api/webhooks",
        json!({"name": "Orders", "url": "https://hooks.example.com/orders", "events": ["order.created"]}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = hook["id"].as_str().unwrap().to_owned();
    let old_secret = hook["secret"].as_str().unwrap().to_owned();

    let (status, rotated) = send(&state, "POST", &format!("/api/webhooks/{id}/rotate-secret"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["secret"], old_secret);

    let (status, record) = send(&state, "POST", &format!("/api/webhooks/{id}/test"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["event"], webhook::TEST_EVENT);

    let (_, hook) = get(&state, &format!("/api/webhooks/{id}")).await;
    assert_eq!(hook["deliveries"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn workflow_activate_and_execute() {
    let state = test_helpers::test_app_state();
    let (status, flow) = post(
        &state,
        "/api/workflows",
        json!({
            "name": "Big orders",
            "trigger": {"event": "order.created"},
            "conditions": [{"field": "total_cents", "operator": "greater_than", "value": 10000}],
            "actions": [{"kind": "notify"}, {"kind": "send_email", "config": {"to": "ops@example.com"}}],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(flow["active"], false);
    let id = flow["id"].as_str().unwrap().to_owned();

    let (status, flow) = post(&state, &format!("/api/workflows/{id}/activate"), json!({"active": true})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(flow["active"], true);

    let (status, run) = post(&state, &format!("/api/workflows/{id}/execute"), json!({"total_cents": 25000})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "succeeded");
    assert_eq!(run["action_results"].as_array().unwrap().len(), 2);

    let (status, run) = send(&state, "POST", &format!("/api/workflows/{id}/execute"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "skipped");
}

#[tokio::test]
async fn failing_simulator_marks_remaining_actions() {
    let state = test_helpers::test_app_state_with_simulator(Simulator::failing());
    let flow = workflow::create_workflow(
        &state,
        serde_json::from_value(json!({
            "name": "Chain",
            "trigger": {"event": "ticket.created"},
            "actions": [{"kind": "notify"}, {"kind": "send_email"}],
        }))
        .unwrap(),
    )
    .await
    .unwrap();

    let (status, run) = send(&state, "POST", &format!("/api/workflows/{}/execute", flow.id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "failed");
    assert_eq!(run["action_results"][1]["status"], "not_attempted");
}
