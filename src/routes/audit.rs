//! Audit log routes. Read-only; every endpoint needs `audit.view`.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use uuid::Uuid;

use crate::routes::actor::Actor;
use crate::routes::extract::{Json, Path, Query};
use crate::routes::{ApiError, ApiResult};
use crate::services::audit::{self as audit_svc, AuditEntry, AuditError, AuditPage, AuditQuery};
use crate::services::team::Permission;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/audit", get(list_entries))
        .route("/api/audit/export.csv", get(export_entries))
        .route("/api/audit/{id}", get(get_entry))
}

pub(crate) fn audit_error_to_status(err: &AuditError) -> StatusCode {
    match err {
        AuditError::NotFound(_) => StatusCode::NOT_FOUND,
        AuditError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        Self::from_service(audit_error_to_status(&err), &err)
    }
}

/// `GET /api/audit?actor=&action=&resource_type=&severity=&since=&until=&search=&limit=&offset=`
async fn list_entries(State(state): State<AppState>, actor: Actor, Query(query): Query<AuditQuery>) -> ApiResult<Json<AuditPage>> {
    actor.require(Permission::AuditView)?;
    Ok(Json(audit_svc::query(&state, &query).await))
}

async fn get_entry(State(state): State<AppState>, actor: Actor, Path(entry_id): Path<Uuid>) -> ApiResult<Json<AuditEntry>> {
    actor.require(Permission::AuditView)?;
    Ok(Json(audit_svc::get_entry(&state, entry_id).await?))
}

/// `GET /api/audit/export.csv` — same filters as the list, without paging.
async fn export_entries(State(state): State<AppState>, actor: Actor, Query(query): Query<AuditQuery>) -> ApiResult<Response> {
    actor.require(Permission::AuditView)?;
    let csv = audit_svc::export_csv(&state, &query).await?;
    Ok((
        [(CONTENT_TYPE, "text/csv; charset=utf-8"), (CONTENT_DISPOSITION, "attachment; filename=\"audit-log.csv\"")],
        csv,
    )
        .into_response())
}

#[cfg(test)]
#[path = "audit_test.rs"]
mod tests;
