//! Domain routes — availability search, purchase, connect, DNS verify, SSL.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::routes::actor::Actor;
use crate::routes::extract::{Json, Path, Query};
use crate::routes::{ApiError, ApiResult, audit, audit_with};
use crate::services::audit::Severity;
use crate::services::domain::{self, Availability, Domain, DomainError};
use crate::services::events::spawn_event;
use crate::services::team::Permission;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/domains", get(list_domains))
        .route("/api/domains/search", get(search_domains))
        .route("/api/domains/purchase", post(purchase_domain))
        .route("/api/domains/connect", post(connect_domain))
        .route("/api/domains/subdomain", post(claim_subdomain))
        .route("/api/domains/{id}", get(get_domain).delete(delete_domain))
        .route("/api/domains/{id}/verify", post(verify_domain))
        .route("/api/domains/{id}/ssl", post(setup_ssl))
        .route("/api/domains/{id}/primary", post(set_primary))
        .route("/api/domains/{id}/auto-renew", patch(set_auto_renew))
}

pub(crate) fn domain_error_to_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::AlreadyExists(_) | DomainError::Unavailable(_) | DomainError::PrimaryInUse => StatusCode::CONFLICT,
        DomainError::InvalidName(_) | DomainError::UnsupportedTld(_) | DomainError::NotActive(_) | DomainError::Validation(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        DomainError::PurchaseFailed(_) | DomainError::VerificationFailed(_) | DomainError::SslFailed(_) => StatusCode::BAD_GATEWAY,
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::from_service(domain_error_to_status(&err), &err)
    }
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct PurchaseBody {
    pub name: String,
    #[serde(default = "default_years")]
    pub years: u32,
}

fn default_years() -> u32 {
    1
}

#[derive(Deserialize)]
pub struct ConnectBody {
    pub name: String,
}

#[derive(Deserialize)]
pub struct SubdomainBody {
    pub label: String,
}

#[derive(Deserialize)]
pub struct AutoRenewBody {
    pub auto_renew: bool,
}

fn domain_payload(domain: &Domain) -> serde_json::Value {
    json!({ "domain_id": domain.id, "name": domain.name, "kind": domain.kind, "status": domain.status })
}

async fn list_domains(State(state): State<AppState>) -> Json<Vec<Domain>> {
    Json(domain::list_domains(&state).await)
}

/// `GET /api/domains/search?q=acme` — one row per supported TLD.
async fn search_domains(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult<Json<Vec<Availability>>> {
    Ok(Json(domain::search_availability(&state, &params.q).await?))
}

async fn get_domain(State(state): State<AppState>, Path(domain_id): Path<Uuid>) -> ApiResult<Json<Domain>> {
    Ok(Json(domain::get_domain(&state, domain_id).await?))
}

/// `POST /api/domains/purchase` with `{"name": "acme.com", "years": 2}`.
async fn purchase_domain(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<PurchaseBody>,
) -> ApiResult<(StatusCode, Json<Domain>)> {
    actor.require(Permission::DomainsManage)?;
    let domain = domain::purchase_domain(&state, &body.name, body.years).await?;
    audit(
        &state,
        &actor,
        "domain.purchased",
        "domain",
        domain.id,
        format!("Purchased {} for {} year(s)", domain.name, body.years),
    )
    .await;
    spawn_event(&state, "domain.connected", domain_payload(&domain));
    Ok((StatusCode::CREATED, Json(domain)))
}

/// `POST /api/domains/connect` — returns the DNS records to configure.
async fn connect_domain(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<ConnectBody>,
) -> ApiResult<(StatusCode, Json<Domain>)> {
    actor.require(Permission::DomainsManage)?;
    let domain = domain::connect_domain(&state, &body.name).await?;
    audit(&state, &actor, "domain.connected", "domain", domain.id, format!("Connected {}", domain.name)).await;
    spawn_event(&state, "domain.connected", domain_payload(&domain));
    Ok((StatusCode::CREATED, Json(domain)))
}

async fn claim_subdomain(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<SubdomainBody>,
) -> ApiResult<(StatusCode, Json<Domain>)> {
    actor.require(Permission::DomainsManage)?;
    let domain = domain::claim_subdomain(&state, &body.label).await?;
    audit(&state, &actor, "domain.claimed", "domain", domain.id, format!("Claimed {}", domain.name)).await;
    Ok((StatusCode::CREATED, Json(domain)))
}

async fn verify_domain(State(state): State<AppState>, actor: Actor, Path(domain_id): Path<Uuid>) -> ApiResult<Json<Domain>> {
    actor.require(Permission::DomainsManage)?;
    let domain = domain::verify_domain(&state, domain_id).await?;
    audit(&state, &actor, "domain.verified", "domain", domain.id, format!("Verified DNS for {}", domain.name)).await;
    Ok(Json(domain))
}

async fn setup_ssl(State(state): State<AppState>, actor: Actor, Path(domain_id): Path<Uuid>) -> ApiResult<Json<Domain>> {
    actor.require(Permission::DomainsManage)?;
    let domain = domain::setup_ssl(&state, domain_id).await?;
    audit(&state, &actor, "domain.ssl_issued", "domain", domain.id, format!("Certificate active for {}", domain.name)).await;
    Ok(Json(domain))
}

async fn set_primary(State(state): State<AppState>, actor: Actor, Path(domain_id): Path<Uuid>) -> ApiResult<Json<Domain>> {
    actor.require(Permission::DomainsManage)?;
    let domain = domain::set_primary(&state, domain_id).await?;
    audit_with(&state, &actor, "domain.primary_changed", "domain", domain.id, format!("{} is now primary", domain.name), Severity::Warning)
        .await;
    Ok(Json(domain))
}

async fn set_auto_renew(
    State(state): State<AppState>,
    actor: Actor,
    Path(domain_id): Path<Uuid>,
    Json(body): Json<AutoRenewBody>,
) -> ApiResult<Json<Domain>> {
    actor.require(Permission::DomainsManage)?;
    let domain = domain::set_auto_renew(&state, domain_id, body.auto_renew).await?;
    let state_word = if domain.auto_renew { "on" } else { "off" };
    audit(&state, &actor, "domain.auto_renew", "domain", domain.id, format!("Auto-renew {state_word} for {}", domain.name)).await;
    Ok(Json(domain))
}

async fn delete_domain(State(state): State<AppState>, actor: Actor, Path(domain_id): Path<Uuid>) -> ApiResult<StatusCode> {
    actor.require(Permission::DomainsManage)?;
    let domain = domain::delete_domain(&state, domain_id).await?;
    audit_with(&state, &actor, "domain.removed", "domain", domain.id, format!("Removed {}", domain.name), Severity::Critical).await;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "domains_test.rs"]
mod tests;
