use super::*;

use crate::routes::test_support::{get, post, send};
use crate::services::domain::{TLD_PRICES, registered_elsewhere};
use crate::services::simulate::Simulator;
use crate::state::test_helpers;

fn free_name(stem: &str) -> String {
    (0..)
        .map(|i| format!("{stem}{i}.com"))
        .find(|name| !registered_elsewhere(name))
        .unwrap()
}

#[test]
fn retryable_failures_are_bad_gateway() {
    assert_eq!(domain_error_to_status(&DomainError::SslFailed("a.com".into())), StatusCode::BAD_GATEWAY);
    assert_eq!(domain_error_to_status(&DomainError::PrimaryInUse), StatusCode::CONFLICT);
    assert_eq!(domain_error_to_status(&DomainError::InvalidName("x".into())), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn search_lists_every_tld() {
    let state = test_helpers::test_app_state();
    let (status, results) = get(&state, "/api/domains/search?q=acme").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results.as_array().unwrap().len(), TLD_PRICES.len());
    assert_eq!(results[0]["name"], "acme.com");
}

#[tokio::test]
async fn connect_verify_and_secure() {
    let state = test_helpers::test_app_state();
    let name = free_name("mystore");
    let (status, domain) = post(&state, "/api/domains/connect", json!({ "name": name })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(domain["status"], "pending");
    assert_eq!(domain["dns_records"].as_array().unwrap().len(), 2);
    let id = domain["id"].as_str().unwrap().to_owned();

    let (status, body) = send(&state, "POST", &format!("/api/domains/{id}/ssl"), None, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "E_DOMAIN_NOT_ACTIVE");

    let (status, domain) = send(&state, "POST", &format!("/api/domains/{id}/verify"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(domain["status"], "active");
    assert_eq!(domain["primary"], true);

    let (status, domain) = send(&state, "POST", &format!("/api/domains/{id}/ssl"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(domain["ssl"], "active");

    let (status, _) = post(&state, "/api/domains/connect", json!({ "name": name })).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn purchase_and_auto_renew() {
    let state = test_helpers::test_app_state();
    let name = free_name("bought");
    let (status, domain) = post(&state, "/api/domains/purchase", json!({ "name": name, "years": 2 })).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(domain["kind"], "purchased");
    assert_eq!(domain["auto_renew"], true);
    let id = domain["id"].as_str().unwrap().to_owned();

    let (status, domain) =
        send(&state, "PATCH", &format!("/api/domains/{id}/auto-renew"), None, Some(json!({"auto_renew": false}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(domain["auto_renew"], false);

    let (status, _) = post(&state, "/api/domains/purchase", json!({ "name": "acme.xyz" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn primary_cannot_be_deleted_while_others_exist() {
    let state = test_helpers::test_app_state();
    let (status, first) = post(&state, "/api/domains/subdomain", json!({"label": "shop"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["primary"], true);
    let (_, second) = post(&state, "/api/domains/subdomain", json!({"label": "blog"})).await;
    let first_id = first["id"].as_str().unwrap().to_owned();
    let second_id = second["id"].as_str().unwrap().to_owned();

    let (status, body) = send(&state, "DELETE", &format!("/api/domains/{first_id}"), None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "E_PRIMARY_IN_USE");

    let (status, _) = send(&state, "POST", &format!("/api/domains/{second_id}/primary"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&state, "DELETE", &format!("/api/domains/{first_id}"), None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn failed_verification_is_retryable() {
    let state = test_helpers::test_app_state_with_simulator(Simulator::failing());
    let name = free_name("flaky");
    let (_, domain) = post(&state, "/api/domains/connect", json!({ "name": name })).await;
    let id = domain["id"].as_str().unwrap().to_owned();
    let (status, body) = send(&state, "POST", &format!("/api/domains/{id}/verify"), None, None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "E_VERIFICATION_FAILED");
    assert_eq!(body["retryable"], true);
    let (_, domain) = get(&state, &format!("/api/domains/{id}")).await;
    assert_eq!(domain["status"], "failed");
}
