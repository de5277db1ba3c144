use super::*;
use serde_json::Value;

use crate::routes::test_support::{get, post, send};
use crate::services::simulate::Simulator;
use crate::state::test_helpers;

#[test]
fn builder_error_to_status_maps() {
    assert_eq!(builder_error_to_status(&BuilderError::PageNotFound(Uuid::nil())), StatusCode::NOT_FOUND);
    assert_eq!(builder_error_to_status(&BuilderError::ParentNotFound("x".into())), StatusCode::NOT_FOUND);
    assert_eq!(builder_error_to_status(&BuilderError::SlugTaken("home".into())), StatusCode::CONFLICT);
    assert_eq!(builder_error_to_status(&BuilderError::PublishFailed(Uuid::nil())), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn page_lifecycle_over_http() {
    let state = test_helpers::test_app_state();
    let (status, page) = post(&state, "/api/pages", json!({"name": "Home"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(page["slug"], "home");
    let id = page["id"].as_str().unwrap().to_owned();

    let (status, _) = post(&state, "/api/pages", json!({"name": "Other", "slug": "home"})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, section) = post(&state, &format!("/api/pages/{id}/elements"), json!({"type": "section"})).await;
    assert_eq!(status, StatusCode::CREATED);
    let section_id = section["id"].as_str().unwrap().to_owned();

    let (status, _) = post(&state, &format!("/api/pages/{id}/elements"), json!({"type": "text", "parent_id": section_id})).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = post(&state, &format!("/api/pages/{id}/elements"), json!({"type": "text", "parent_id": "element-missing"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, updated) = send(
        &state,
        "PATCH",
        &format!("/api/pages/{id}/elements/{section_id}"),
        None,
        Some(json!({"styles": {"padding": "32px"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["styles"]["padding"], "32px");

    let (status, removed) = send(&state, "DELETE", &format!("/api/pages/{id}/elements/{section_id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["removed"], 2);

    let (_, page) = get(&state, &format!("/api/pages/{id}")).await;
    assert_eq!(page["elements"], Value::Array(Vec::new()));
}

#[tokio::test]
async fn publish_defaults_to_true_and_reports_failures() {
    let state = test_helpers::test_app_state();
    let page = builder::create_page(&state, "Home", None).await.unwrap();
    let (status, body) = send(&state, "POST", &format!("/api/pages/{}/publish", page.id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["published"], true);

    let (status, body) = post(&state, &format!("/api/pages/{}/publish", page.id), json!({"published": false})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["published"], false);

    let failing = test_helpers::test_app_state_with_simulator(Simulator::failing());
    let page = builder::create_page(&failing, "Home", None).await.unwrap();
    let (status, body) = send(&failing, "POST", &format!("/api/pages/{}/publish", page.id), None, None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "E_PUBLISH_FAILED");
}

#[tokio::test]
async fn export_then_import() {
    let state = test_helpers::test_app_state();
    let page = builder::create_page(&state, "Landing", None).await.unwrap();
    builder::add_element(&state, page.id, ElementDraft::new(crate::tree::ElementType::Header)).await.unwrap();

    let (status, doc) = get(&state, &format!("/api/pages/{}/export", page.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["format"], builder::EXPORT_FORMAT);

    let (status, imported) = post(&state, "/api/pages/import", doc).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(imported["slug"], "landing-2");
    assert_eq!(imported["elements"].as_array().unwrap().len(), 1);
}
