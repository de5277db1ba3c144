use super::test_support::{get, send};
use super::*;
use serde_json::json;

use crate::services::team::{self, MemberStatus, NewInvite, VIEWER_ROLE};
use crate::state::test_helpers;

#[tokio::test]
async fn healthz_ok() {
    let state = test_helpers::test_app_state();
    let (status, body) = get(&state, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());
}

#[tokio::test]
async fn error_body_has_code_and_message() {
    let state = test_helpers::test_app_state();
    let (status, body) = get(&state, &format!("/api/pages/{}", uuid::Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "E_PAGE_NOT_FOUND");
    assert!(body["message"].as_str().unwrap().contains("page not found"));
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn missing_actor_rejected_when_required() {
    let state = test_helpers::test_app_state_with_config(|c| c.require_actor = true);
    let (status, body) = send(&state, "POST", "/api/pages", None, Some(json!({"name": "Home"}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "E_ACTOR_REQUIRED");
}

#[tokio::test]
async fn actor_header_is_validated() {
    let state = test_helpers::test_app_state();
    let body = Some(json!({"name": "Home"}));

    let (status, _) = send(&state, "POST", "/api/pages", Some(uuid::Uuid::new_v4()), body.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let viewer = state.team.read().await.role_named(VIEWER_ROLE).unwrap().id;
    let invited = team::invite_member(&state, NewInvite { name: "Vic".into(), email: "vic@example.com".into(), role_id: viewer })
        .await
        .unwrap();
    let (status, body_json) = send(&state, "POST", "/api/pages", Some(invited.id), body.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body_json["code"], "E_ACTOR_INACTIVE");

    let active = team::accept_invite(&state, invited.id).await.unwrap();
    assert_eq!(active.status, MemberStatus::Active);
    let (status, body_json) = send(&state, "POST", "/api/pages", Some(active.id), body).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body_json["code"], "E_FORBIDDEN");
}

#[tokio::test]
async fn mutations_are_audited_with_actor() {
    let state = test_helpers::test_app_state();
    let (status, _) = send(&state, "POST", "/api/pages", None, Some(json!({"name": "Home"}))).await;
    assert_eq!(status, StatusCode::CREATED);

    let page = audit_svc::query(&state, &audit_svc::AuditQuery::default()).await;
    assert_eq!(page.total, 1);
    assert_eq!(page.entries[0].action, "page.created");
    assert_eq!(page.entries[0].actor, "system");
}

async fn send_text(state: &AppState, method: &str, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
    use axum::body::Body;
    use tower::ServiceExt;

    let req = axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap();
    let resp = app(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn malformed_json_body_uses_error_shape() {
    let state = test_helpers::test_app_state();
    let (status, body) = send_text(&state, "POST", "/api/pages", "{\"name\": ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "E_INVALID_BODY");
    assert_eq!(body["retryable"], false);

    let (status, body) = send_text(&state, "POST", "/api/pages", "{\"name\": 42}").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "E_INVALID_BODY");
}

#[tokio::test]
async fn bad_path_and_query_use_error_shape() {
    let state = test_helpers::test_app_state();
    let (status, body) = get(&state, "/api/pages/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "E_INVALID_PATH");

    let (status, body) = get(&state, "/api/orders?status=lost").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "E_INVALID_QUERY");
}

#[tokio::test]
async fn optional_body_may_be_omitted_but_not_malformed() {
    let state = test_helpers::test_app_state();
    let (_, page) = test_support::post(&state, "/api/pages", json!({"name": "Home"})).await;
    let id = page["id"].as_str().unwrap().to_owned();

    let (status, page) = send(&state, "POST", &format!("/api/pages/{id}/publish"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["published"], true);

    let (status, body) = send_text(&state, "POST", &format!("/api/pages/{id}/publish"), "{oops").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "E_INVALID_BODY");
}
