//! Integration routes — API keys, webhooks, automation workflows.
//!
//! Everything under here requires `integrations.manage` for writes. Reads
//! are open to any resolved actor, matching the rest of the console.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::routes::actor::Actor;
use crate::routes::extract::{Json, Path};
use crate::routes::{ApiError, ApiResult, audit, audit_with};
use crate::services::api_key::{self, ApiKey, ApiKeyError, ApiKeyPatch, ConnectionTest, NewApiKey};
use crate::services::audit::Severity;
use crate::services::team::Permission;
use crate::services::webhook::{self, DeliveryRecord, EVENT_CATALOG, NewWebhook, Webhook, WebhookError, WebhookPatch};
use crate::services::workflow::{self, NewWorkflow, Workflow, WorkflowError, WorkflowPatch, WorkflowRun};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/api-keys", get(list_api_keys).post(create_api_key))
        .route("/api/api-keys/{id}", get(get_api_key).patch(update_api_key).delete(delete_api_key))
        .route("/api/api-keys/{id}/test", post(test_api_key))
        .route("/api/webhooks", get(list_webhooks).post(create_webhook))
        .route("/api/webhooks/events", get(list_events))
        .route("/api/webhooks/{id}", get(get_webhook).patch(update_webhook).delete(delete_webhook))
        .route("/api/webhooks/{id}/rotate-secret", post(rotate_secret))
        .route("/api/webhooks/{id}/test", post(test_webhook))
        .route("/api/workflows", get(list_workflows).post(create_workflow))
        .route("/api/workflows/{id}", get(get_workflow).patch(update_workflow).delete(delete_workflow))
        .route("/api/workflows/{id}/activate", post(activate_workflow))
        .route("/api/workflows/{id}/execute", post(execute_workflow))
}

// =============================================================================
// ERROR MAPPING
// =============================================================================

pub(crate) fn api_key_error_to_status(err: &ApiKeyError) -> StatusCode {
    match err {
        ApiKeyError::NotFound(_) => StatusCode::NOT_FOUND,
        ApiKeyError::Duplicate(_) | ApiKeyError::Revoked(_) => StatusCode::CONFLICT,
        ApiKeyError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

pub(crate) fn webhook_error_to_status(err: &WebhookError) -> StatusCode {
    match err {
        WebhookError::NotFound(_) => StatusCode::NOT_FOUND,
        WebhookError::InvalidUrl(_) | WebhookError::UnknownEvent(_) | WebhookError::Validation(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    }
}

pub(crate) fn workflow_error_to_status(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::UnknownEvent(_) | WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl From<ApiKeyError> for ApiError {
    fn from(err: ApiKeyError) -> Self {
        Self::from_service(api_key_error_to_status(&err), &err)
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        Self::from_service(webhook_error_to_status(&err), &err)
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        Self::from_service(workflow_error_to_status(&err), &err)
    }
}

// =============================================================================
// API KEYS
// =============================================================================

async fn list_api_keys(State(state): State<AppState>) -> Json<Vec<ApiKey>> {
    Json(api_key::list_api_keys(&state).await)
}

/// `POST /api/api-keys` — the response carries only the masked key.
async fn create_api_key(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<NewApiKey>,
) -> ApiResult<(StatusCode, Json<ApiKey>)> {
    actor.require(Permission::IntegrationsManage)?;
    let key = api_key::create_api_key(&state, body).await?;
    audit(&state, &actor, "api_key.created", "api_key", key.id, format!("Added {} key {}", key.service, key.name)).await;
    Ok((StatusCode::CREATED, Json(key)))
}

async fn get_api_key(State(state): State<AppState>, Path(key_id): Path<Uuid>) -> ApiResult<Json<ApiKey>> {
    Ok(Json(api_key::get_api_key(&state, key_id).await?))
}

async fn update_api_key(
    State(state): State<AppState>,
    actor: Actor,
    Path(key_id): Path<Uuid>,
    Json(body): Json<ApiKeyPatch>,
) -> ApiResult<Json<ApiKey>> {
    actor.require(Permission::IntegrationsManage)?;
    let key = api_key::update_api_key(&state, key_id, body).await?;
    audit(&state, &actor, "api_key.updated", "api_key", key.id, format!("Updated key {}", key.name)).await;
    Ok(Json(key))
}

async fn delete_api_key(State(state): State<AppState>, actor: Actor, Path(key_id): Path<Uuid>) -> ApiResult<StatusCode> {
    actor.require(Permission::IntegrationsManage)?;
    let key = api_key::delete_api_key(&state, key_id).await?;
    audit_with(&state, &actor, "api_key.deleted", "api_key", key.id, format!("Deleted key {}", key.name), Severity::Warning).await;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/api-keys/:id/test` — a failed check is still a 200 with
/// `success: false`.
async fn test_api_key(State(state): State<AppState>, actor: Actor, Path(key_id): Path<Uuid>) -> ApiResult<Json<ConnectionTest>> {
    actor.require(Permission::IntegrationsManage)?;
    let result = api_key::test_api_key(&state, key_id).await?;
    audit(&state, &actor, "api_key.tested", "api_key", key_id, result.message.clone()).await;
    Ok(Json(result))
}

// =============================================================================
// WEBHOOKS
// =============================================================================

async fn list_webhooks(State(state): State<AppState>) -> Json<Vec<Webhook>> {
    Json(webhook::list_webhooks(&state).await)
}

/// `GET /api/webhooks/events` — the subscribable event catalog.
async fn list_events() -> Json<&'static [&'static str]> {
    Json(EVENT_CATALOG)
}

async fn create_webhook(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<NewWebhook>,
) -> ApiResult<(StatusCode, Json<Webhook>)> {
    actor.require(Permission::IntegrationsManage)?;
    let hook = webhook::create_webhook(&state, body).await?;
    audit(&state, &actor, "webhook.created", "webhook", hook.id, format!("Created webhook {} -> {}", hook.name, hook.url)).await;
    Ok((StatusCode::CREATED, Json(hook)))
}

async fn get_webhook(State(state): State<AppState>, Path(webhook_id): Path<Uuid>) -> ApiResult<Json<Webhook>> {
    Ok(Json(webhook::get_webhook(&state, webhook_id).await?))
}

async fn update_webhook(
    State(state): State<AppState>,
    actor: Actor,
    Path(webhook_id): Path<Uuid>,
    Json(body): Json<WebhookPatch>,
) -> ApiResult<Json<Webhook>> {
    actor.require(Permission::IntegrationsManage)?;
    let hook = webhook::update_webhook(&state, webhook_id, body).await?;
    audit(&state, &actor, "webhook.updated", "webhook", hook.id, format!("Updated webhook {}", hook.name)).await;
    Ok(Json(hook))
}

async fn delete_webhook(State(state): State<AppState>, actor: Actor, Path(webhook_id): Path<Uuid>) -> ApiResult<StatusCode> {
    actor.require(Permission::IntegrationsManage)?;
    let hook = webhook::delete_webhook(&state, webhook_id).await?;
    audit_with(&state, &actor, "webhook.deleted", "webhook", hook.id, format!("Deleted webhook {}", hook.name), Severity::Warning)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

async fn rotate_secret(State(state): State<AppState>, actor: Actor, Path(webhook_id): Path<Uuid>) -> ApiResult<Json<Webhook>> {
    actor.require(Permission::IntegrationsManage)?;
    let hook = webhook::rotate_secret(&state, webhook_id).await?;
    audit_with(&state, &actor, "webhook.secret_rotated", "webhook", hook.id, format!("Rotated secret for {}", hook.name), Severity::Warning)
        .await;
    Ok(Json(hook))
}

async fn test_webhook(State(state): State<AppState>, actor: Actor, Path(webhook_id): Path<Uuid>) -> ApiResult<Json<DeliveryRecord>> {
    actor.require(Permission::IntegrationsManage)?;
    let record = webhook::test_webhook(&state, webhook_id).await?;
    let outcome = if record.success { "succeeded" } else { "failed" };
    audit(&state, &actor, "webhook.tested", "webhook", webhook_id, format!("Test delivery {outcome}")).await;
    Ok(Json(record))
}

// =============================================================================
// WORKFLOWS
// =============================================================================

#[derive(Deserialize)]
pub struct ActivateBody {
    pub active: bool,
}

async fn list_workflows(State(state): State<AppState>) -> Json<Vec<Workflow>> {
    Json(workflow::list_workflows(&state).await)
}

async fn create_workflow(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<NewWorkflow>,
) -> ApiResult<(StatusCode, Json<Workflow>)> {
    actor.require(Permission::IntegrationsManage)?;
    let flow = workflow::create_workflow(&state, body).await?;
    audit(
        &state,
        &actor,
        "workflow.created",
        "workflow",
        flow.id,
        format!("Created workflow {} on {}", flow.name, flow.trigger.event),
    )
    .await;
    Ok((StatusCode::CREATED, Json(flow)))
}

async fn get_workflow(State(state): State<AppState>, Path(workflow_id): Path<Uuid>) -> ApiResult<Json<Workflow>> {
    Ok(Json(workflow::get_workflow(&state, workflow_id).await?))
}

async fn update_workflow(
    State(state): State<AppState>,
    actor: Actor,
    Path(workflow_id): Path<Uuid>,
    Json(body): Json<WorkflowPatch>,
) -> ApiResult<Json<Workflow>> {
    actor.require(Permission::IntegrationsManage)?;
    let flow = workflow::update_workflow(&state, workflow_id, body).await?;
    audit(&state, &actor, "workflow.updated", "workflow", flow.id, format!("Updated workflow {}", flow.name)).await;
    Ok(Json(flow))
}

async fn delete_workflow(State(state): State<AppState>, actor: Actor, Path(workflow_id): Path<Uuid>) -> ApiResult<StatusCode> {
    actor.require(Permission::IntegrationsManage)?;
    let flow = workflow::delete_workflow(&state, workflow_id).await?;
    audit_with(&state, &actor, "workflow.deleted", "workflow", flow.id, format!("Deleted workflow {}", flow.name), Severity::Warning)
        .await;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/workflows/:id/activate` with `{"active": bool}`.
async fn activate_workflow(
    State(state): State<AppState>,
    actor: Actor,
    Path(workflow_id): Path<Uuid>,
    Json(body): Json<ActivateBody>,
) -> ApiResult<Json<Workflow>> {
    actor.require(Permission::IntegrationsManage)?;
    let flow = workflow::set_active(&state, workflow_id, body.active).await?;
    let verb = if flow.active { "Activated" } else { "Paused" };
    audit(&state, &actor, "workflow.toggled", "workflow", flow.id, format!("{verb} workflow {}", flow.name)).await;
    Ok(Json(flow))
}

/// `POST /api/workflows/:id/execute` — the body, if any, is the sample
/// payload conditions are evaluated against.
async fn execute_workflow(
    State(state): State<AppState>,
    actor: Actor,
    Path(workflow_id): Path<Uuid>,
    body: Option<Json<Value>>,
) -> ApiResult<Json<WorkflowRun>> {
    actor.require(Permission::IntegrationsManage)?;
    let payload = body.map_or_else(|| json!({}), |Json(v)| v);
    let run = workflow::execute_workflow(&state, workflow_id, &payload).await?;
    audit(&state, &actor, "workflow.executed", "workflow", workflow_id, format!("Manual run {:?}", run.status).to_lowercase()).await;
    Ok(Json(run))
}

#[cfg(test)]
#[path = "integrations_test.rs"]
mod tests;
