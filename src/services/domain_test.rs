use super::*;

use crate::services::simulate::Simulator;
use crate::state::test_helpers;

/// A `.com` name the simulated registry does not report as taken.
fn free_name(stem: &str) -> String {
    (0..)
        .map(|i| format!("{stem}{i}.com"))
        .find(|name| !registered_elsewhere(name))
        .unwrap()
}

#[test]
fn name_validation() {
    assert_eq!(validate_domain_name(" Shop.Example.COM. ").unwrap(), "shop.example.com");
    let long_label = format!("{}.com", "a".repeat(64));
    for bad in ["", "localhost", "-bad.com", "bad-.com", "a..com", "under_score.com", "spa ce.com", long_label.as_str()] {
        assert!(matches!(validate_domain_name(bad), Err(DomainError::InvalidName(_))), "{bad}");
    }
    let long = format!("{}.com", vec!["a".repeat(60); 5].join("."));
    assert!(long.len() > 253);
    assert!(validate_domain_name(&long).is_err());
}

#[test]
fn registry_answer_is_stable() {
    assert_eq!(registered_elsewhere("acme.com"), registered_elsewhere("acme.com"));
}

#[tokio::test]
async fn search_covers_price_table() {
    let state = test_helpers::test_app_state();
    let results = search_availability(&state, "Acme Shop").await.unwrap();
    assert_eq!(results.len(), TLD_PRICES.len());
    for (result, (tld, price)) in results.iter().zip(TLD_PRICES) {
        assert_eq!(result.name, format!("acmeshop.{tld}"));
        assert_eq!(result.price_cents, *price);
        assert_eq!(result.available, !registered_elsewhere(&result.name));
    }

    let single = search_availability(&state, "acme.io").await.unwrap();
    assert_eq!(single.len(), 1);
    assert_eq!(single[0].tld, "io");
}

#[tokio::test]
async fn owned_names_are_never_available() {
    let state = test_helpers::test_app_state();
    let name = free_name("owned");
    connect_domain(&state, &name).await.unwrap();
    let results = search_availability(&state, &name).await.unwrap();
    assert!(!results[0].available);
}

#[tokio::test]
async fn purchase_activates_with_expiry() {
    let state = test_helpers::test_app_state();
    let name = free_name("bought");
    let domain = purchase_domain(&state, &name, 2).await.unwrap();
    assert_eq!(domain.kind, DomainKind::Purchased);
    assert_eq!(domain.status, DomainStatus::Active);
    assert!(domain.auto_renew);
    let expires = domain.expires_at.unwrap();
    assert!(expires - domain.created_at >= 2 * MS_PER_YEAR);
    // First active domain becomes primary.
    assert!(domain.primary);

    assert!(matches!(purchase_domain(&state, &name, 1).await, Err(DomainError::AlreadyExists(_))));
}

#[tokio::test]
async fn purchase_validates() {
    let state = test_helpers::test_app_state();
    let name = free_name("years");
    assert!(matches!(purchase_domain(&state, &name, 0).await, Err(DomainError::Validation(_))));
    assert!(matches!(purchase_domain(&state, &name, 11).await, Err(DomainError::Validation(_))));
    assert!(matches!(purchase_domain(&state, "acme.xyz", 1).await, Err(DomainError::UnsupportedTld(_))));

    let taken = (0..)
        .map(|i| format!("taken{i}.com"))
        .find(|n| registered_elsewhere(n))
        .unwrap();
    assert!(matches!(purchase_domain(&state, &taken, 1).await, Err(DomainError::Unavailable(_))));
}

#[tokio::test]
async fn failed_purchase_records_nothing() {
    let state = test_helpers::test_app_state_with_simulator(Simulator::failing());
    let err = purchase_domain(&state, &free_name("fail"), 1).await.unwrap_err();
    assert!(matches!(err, DomainError::PurchaseFailed(_)));
    assert!(err.retryable());
    assert!(list_domains(&state).await.is_empty());
}

#[tokio::test]
async fn connect_is_pending_with_records() {
    let state = test_helpers::test_app_state();
    let domain = connect_domain(&state, "shop.example.org").await.unwrap();
    assert_eq!(domain.status, DomainStatus::Pending);
    assert!(!domain.primary);
    let types: Vec<&str> = domain.dns_records.iter().map(|r| r.record_type.as_str()).collect();
    assert_eq!(types, ["A", "CNAME"]);
    assert_eq!(domain.dns_records[1].value, state.config.platform_domain);

    assert!(matches!(connect_domain(&state, "SHOP.example.org").await, Err(DomainError::AlreadyExists(_))));
    let platform = format!("x.{}", state.config.platform_domain);
    assert!(matches!(connect_domain(&state, &platform).await, Err(DomainError::Validation(_))));
}

#[tokio::test]
async fn verify_then_ssl() {
    let state = test_helpers::test_app_state();
    let domain = connect_domain(&state, "shop.example.org").await.unwrap();
    assert!(matches!(setup_ssl(&state, domain.id).await, Err(DomainError::NotActive(_))));

    let verified = verify_domain(&state, domain.id).await.unwrap();
    assert_eq!(verified.status, DomainStatus::Active);
    assert!(verified.primary);

    let secured = setup_ssl(&state, domain.id).await.unwrap();
    assert_eq!(secured.ssl, SslStatus::Active);
}

#[tokio::test]
async fn failed_verification_marks_failed() {
    let state = test_helpers::test_app_state_with_simulator(Simulator::failing());
    let domain = connect_domain(&state, "shop.example.org").await.unwrap();
    assert!(matches!(verify_domain(&state, domain.id).await, Err(DomainError::VerificationFailed(_))));
    assert_eq!(get_domain(&state, domain.id).await.unwrap().status, DomainStatus::Failed);
}

#[tokio::test]
async fn primary_moves_and_protects_delete() {
    let state = test_helpers::test_app_state();
    let sub = claim_subdomain(&state, "acme").await.unwrap();
    assert_eq!(sub.name, format!("acme.{}", state.config.platform_domain));
    assert!(sub.primary);

    let bought = purchase_domain(&state, &free_name("primary"), 1).await.unwrap();
    assert!(!bought.primary);
    let pending = connect_domain(&state, "shop.example.org").await.unwrap();
    assert!(matches!(set_primary(&state, pending.id).await, Err(DomainError::NotActive(_))));

    set_primary(&state, bought.id).await.unwrap();
    assert!(!get_domain(&state, sub.id).await.unwrap().primary);
    assert_eq!(list_domains(&state).await[0].id, bought.id);

    assert!(matches!(delete_domain(&state, bought.id).await, Err(DomainError::PrimaryInUse)));
    delete_domain(&state, sub.id).await.unwrap();
    delete_domain(&state, pending.id).await.unwrap();
    // Last remaining domain may go even though it is primary.
    delete_domain(&state, bought.id).await.unwrap();
}

#[tokio::test]
async fn auto_renew_only_for_purchased() {
    let state = test_helpers::test_app_state();
    let sub = claim_subdomain(&state, "acme").await.unwrap();
    assert!(matches!(set_auto_renew(&state, sub.id, true).await, Err(DomainError::Validation(_))));
    let bought = purchase_domain(&state, &free_name("renew"), 1).await.unwrap();
    assert!(!set_auto_renew(&state, bought.id, false).await.unwrap().auto_renew);
}
