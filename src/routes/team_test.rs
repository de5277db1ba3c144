use super::*;

use crate::routes::test_support::{get, post, send};
use crate::services::simulate::Simulator;
use crate::services::team::{EDITOR_ROLE, OWNER_ROLE};
use crate::state::test_helpers;

async fn role_id(state: &AppState, name: &str) -> Uuid {
    state.team.read().await.role_named(name).unwrap().id
}

#[test]
fn team_error_to_status_maps() {
    assert_eq!(team_error_to_status(&TeamError::LastOwner), StatusCode::CONFLICT);
    assert_eq!(team_error_to_status(&TeamError::InviteFailed), StatusCode::BAD_GATEWAY);
    assert_eq!(team_error_to_status(&TeamError::RoleNotFound(Uuid::nil())), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invite_accept_and_me() {
    let state = test_helpers::test_app_state();
    let editor = role_id(&state, EDITOR_ROLE).await;
    let (status, member) = post(&state, "/api/members", json!({"name": "Eve", "email": "eve@example.com", "role_id": editor})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(member["status"], "invited");
    let id: Uuid = member["id"].as_str().unwrap().parse().unwrap();

    let (status, body) = post(&state, "/api/members", json!({"name": "Eve 2", "email": "EVE@example.com", "role_id": editor})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "E_DUPLICATE_EMAIL");

    let (status, member) = send(&state, "POST", &format!("/api/members/{id}/accept"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(member["status"], "active");

    let (status, me) = send(&state, "GET", "/api/me", Some(id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["name"], "Eve");
    assert!(me["permissions"].as_array().unwrap().contains(&json!("pages.edit")));

    let (status, _) = send(&state, "POST", "/api/roles", Some(id), Some(json!({"name": "X", "permissions": []}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, me) = get(&state, "/api/me").await;
    assert!(me["member"].is_null());
    assert_eq!(me["name"], "system");
}

#[tokio::test]
async fn last_owner_is_protected() {
    let state = test_helpers::test_app_state();
    let owner = role_id(&state, OWNER_ROLE).await;
    let member = team::invite_member(&state, NewInvite { name: "Olga".into(), email: "olga@example.com".into(), role_id: owner })
        .await
        .unwrap();
    team::accept_invite(&state, member.id).await.unwrap();

    let (status, body) =
        send(&state, "PATCH", &format!("/api/members/{}", member.id), None, Some(json!({"status": "suspended"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "E_LAST_OWNER");

    let (status, _) = send(&state, "DELETE", &format!("/api/members/{}", member.id), None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn system_roles_are_immutable() {
    let state = test_helpers::test_app_state();
    let owner = role_id(&state, OWNER_ROLE).await;
    let (status, body) = send(&state, "DELETE", &format!("/api/roles/{owner}"), None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "E_ROLE_IMMUTABLE");

    let (status, role) = post(&state, "/api/roles", json!({"name": "Support", "permissions": ["support.manage"]})).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&state, "DELETE", &format!("/api/roles/{}", role["id"].as_str().unwrap()), None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn failed_invite_send_is_bad_gateway() {
    let state = test_helpers::test_app_state_with_simulator(Simulator::failing());
    let editor = role_id(&state, EDITOR_ROLE).await;
    let (status, body) = post(&state, "/api/members", json!({"name": "Ian", "email": "ian@example.com", "role_id": editor})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "E_INVITE_FAILED");
    let (_, members) = get(&state, "/api/members").await;
    assert!(members.as_array().unwrap().is_empty());
}
