//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One JSON API per console context, mounted under `/api`. Handlers resolve
//! the acting member (`actor`), check the permission the operation needs,
//! call the service, record an audit entry on success, and fan out catalog
//! events without holding up the response.

pub mod actor;
pub mod audit;
pub mod builder;
pub mod commerce;
pub mod domains;
pub mod extract;
pub mod help;
pub mod integrations;
pub mod team;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::ErrorCode;
use crate::routes::actor::Actor;
use crate::services::audit::{self as audit_svc, NewAuditEntry, Severity};
use crate::state::AppState;

/// Full HTTP surface.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(builder::routes())
        .merge(commerce::routes())
        .merge(integrations::routes())
        .merge(team::routes())
        .merge(audit::routes())
        .merge(help::routes())
        .merge(domains::routes())
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

// =============================================================================
// ERRORS
// =============================================================================

/// JSON error body: `{"code": "E_...", "message": "...", "retryable": bool}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    retryable: bool,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), retryable: false }
    }

    /// Wrap a service error with the status its route module picked.
    pub fn from_service<E: ErrorCode>(status: StatusCode, err: &E) -> Self {
        Self { retryable: err.retryable(), ..Self::new(status, err.error_code(), err.to_string()) }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody { code: self.code, message: &self.message, retryable: self.retryable };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// AUDIT
// =============================================================================

/// Record a successful mutation on behalf of `actor`.
pub(crate) async fn audit(
    state: &AppState,
    actor: &Actor,
    action: &str,
    resource_type: &str,
    resource_id: impl ToString,
    description: impl Into<String>,
) {
    audit_with(state, actor, action, resource_type, resource_id, description, Severity::Info).await;
}

pub(crate) async fn audit_with(
    state: &AppState,
    actor: &Actor,
    action: &str,
    resource_type: &str,
    resource_id: impl ToString,
    description: impl Into<String>,
    severity: Severity,
) {
    let entry = NewAuditEntry::system(action, resource_type, resource_id, description)
        .by(actor.name.clone(), actor.member_id)
        .severity(severity);
    audit_svc::record(state, entry).await;
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::app;
    use crate::routes::actor::ACTOR_HEADER;
    use crate::state::AppState;

    /// Send one request through the full router; returns status and JSON
    /// body (`Null` for empty bodies).
    pub async fn send(state: &AppState, method: &str, uri: &str, actor: Option<Uuid>, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = send_raw(state, method, uri, actor, body).await;
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }

    pub async fn send_raw(state: &AppState, method: &str, uri: &str, actor: Option<Uuid>, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(id) = actor {
            req = req.header(ACTOR_HEADER, id.to_string());
        }
        let req = match body {
            Some(json) => req
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let resp = app(state.clone()).oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    pub async fn get(state: &AppState, uri: &str) -> (StatusCode, Value) {
        send(state, "GET", uri, None, None).await
    }

    pub async fn post(state: &AppState, uri: &str, body: Value) -> (StatusCode, Value) {
        send(state, "POST", uri, None, Some(body)).await
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
