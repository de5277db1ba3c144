//! Page builder routes.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::routes::actor::Actor;
use crate::routes::extract::{Json, Path};
use crate::routes::{ApiError, ApiResult, audit, audit_with};
use crate::services::audit::Severity;
use crate::services::builder::{self, BuilderError, BuilderPage, ElementDraft, PageExport, PagePatch};
use crate::services::events::spawn_event;
use crate::services::team::Permission;
use crate::state::AppState;
use crate::tree::{BuilderElement, ElementPatch};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/pages", get(list_pages).post(create_page))
        .route("/api/pages/import", post(import_page))
        .route("/api/pages/{id}", get(get_page).patch(update_page).delete(delete_page))
        .route("/api/pages/{id}/duplicate", post(duplicate_page))
        .route("/api/pages/{id}/publish", post(publish_page))
        .route("/api/pages/{id}/export", get(export_page))
        .route("/api/pages/{id}/elements", post(add_element))
        .route("/api/pages/{id}/elements/{element_id}", patch(update_element).delete(delete_element))
}

pub(crate) fn builder_error_to_status(err: &BuilderError) -> StatusCode {
    match err {
        BuilderError::PageNotFound(_) | BuilderError::ElementNotFound(_) | BuilderError::ParentNotFound(_) => StatusCode::NOT_FOUND,
        BuilderError::SlugTaken(_) => StatusCode::CONFLICT,
        BuilderError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BuilderError::PublishFailed(_) => StatusCode::BAD_GATEWAY,
    }
}

impl From<BuilderError> for ApiError {
    fn from(err: BuilderError) -> Self {
        Self::from_service(builder_error_to_status(&err), &err)
    }
}

#[derive(Deserialize)]
pub struct CreatePageBody {
    pub name: String,
    pub slug: Option<String>,
}

#[derive(Deserialize)]
pub struct PublishBody {
    #[serde(default = "default_true")]
    pub published: bool,
}

fn default_true() -> bool {
    true
}

/// `GET /api/pages`
async fn list_pages(State(state): State<AppState>) -> Json<Vec<BuilderPage>> {
    Json(builder::list_pages(&state).await)
}

/// `POST /api/pages`
async fn create_page(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<CreatePageBody>,
) -> ApiResult<(StatusCode, Json<BuilderPage>)> {
    actor.require(Permission::PagesEdit)?;
    let page = builder::create_page(&state, &body.name, body.slug.as_deref()).await?;
    audit(&state, &actor, "page.created", "page", page.id, format!("Created page {}", page.name)).await;
    Ok((StatusCode::CREATED, Json(page)))
}

/// `GET /api/pages/:id`
async fn get_page(State(state): State<AppState>, Path(page_id): Path<Uuid>) -> ApiResult<Json<BuilderPage>> {
    Ok(Json(builder::get_page(&state, page_id).await?))
}

/// `PATCH /api/pages/:id`
async fn update_page(
    State(state): State<AppState>,
    actor: Actor,
    Path(page_id): Path<Uuid>,
    Json(body): Json<PagePatch>,
) -> ApiResult<Json<BuilderPage>> {
    actor.require(Permission::PagesEdit)?;
    let page = builder::update_page(&state, page_id, body).await?;
    audit(&state, &actor, "page.updated", "page", page.id, format!("Updated page {}", page.name)).await;
    Ok(Json(page))
}

/// `DELETE /api/pages/:id`
async fn delete_page(State(state): State<AppState>, actor: Actor, Path(page_id): Path<Uuid>) -> ApiResult<StatusCode> {
    actor.require(Permission::PagesEdit)?;
    let page = builder::delete_page(&state, page_id).await?;
    audit_with(&state, &actor, "page.deleted", "page", page.id, format!("Deleted page {}", page.name), Severity::Warning).await;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/pages/:id/duplicate`
async fn duplicate_page(
    State(state): State<AppState>,
    actor: Actor,
    Path(page_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<BuilderPage>)> {
    actor.require(Permission::PagesEdit)?;
    let copy = builder::duplicate_page(&state, page_id).await?;
    audit(&state, &actor, "page.duplicated", "page", copy.id, format!("Duplicated page as {}", copy.slug)).await;
    Ok((StatusCode::CREATED, Json(copy)))
}

/// `POST /api/pages/:id/publish` with `{"published": bool}` (default true).
async fn publish_page(
    State(state): State<AppState>,
    actor: Actor,
    Path(page_id): Path<Uuid>,
    body: Option<Json<PublishBody>>,
) -> ApiResult<Json<BuilderPage>> {
    actor.require(Permission::PagesPublish)?;
    let published = body.is_none_or(|Json(b)| b.published);
    let page = builder::publish_page(&state, page_id, published).await?;
    if page.published {
        audit(&state, &actor, "page.published", "page", page.id, format!("Published page {}", page.name)).await;
        spawn_event(&state, "page.published", json!({ "page_id": page.id, "slug": page.slug, "name": page.name }));
    } else {
        audit(&state, &actor, "page.unpublished", "page", page.id, format!("Unpublished page {}", page.name)).await;
    }
    Ok(Json(page))
}

/// `GET /api/pages/:id/export`
async fn export_page(State(state): State<AppState>, Path(page_id): Path<Uuid>) -> ApiResult<Json<PageExport>> {
    Ok(Json(builder::export_page(&state, page_id).await?))
}

/// `POST /api/pages/import`
async fn import_page(
    State(state): State<AppState>,
    actor: Actor,
    Json(doc): Json<PageExport>,
) -> ApiResult<(StatusCode, Json<BuilderPage>)> {
    actor.require(Permission::PagesEdit)?;
    let page = builder::import_page(&state, doc).await?;
    audit(&state, &actor, "page.imported", "page", page.id, format!("Imported page {}", page.name)).await;
    Ok((StatusCode::CREATED, Json(page)))
}

/// `POST /api/pages/:id/elements`
async fn add_element(
    State(state): State<AppState>,
    actor: Actor,
    Path(page_id): Path<Uuid>,
    Json(draft): Json<ElementDraft>,
) -> ApiResult<(StatusCode, Json<BuilderElement>)> {
    actor.require(Permission::PagesEdit)?;
    let element = builder::add_element(&state, page_id, draft).await?;
    audit(
        &state,
        &actor,
        "element.added",
        "page",
        page_id,
        format!("Added {} {}", element.element_type.as_str(), element.id),
    )
    .await;
    Ok((StatusCode::CREATED, Json(element)))
}

/// `PATCH /api/pages/:id/elements/:element_id`
async fn update_element(
    State(state): State<AppState>,
    actor: Actor,
    Path((page_id, element_id)): Path<(Uuid, String)>,
    Json(patch): Json<ElementPatch>,
) -> ApiResult<Json<BuilderElement>> {
    actor.require(Permission::PagesEdit)?;
    let element = builder::update_element(&state, page_id, &element_id, &patch).await?;
    audit(&state, &actor, "element.updated", "page", page_id, format!("Updated element {element_id}")).await;
    Ok(Json(element))
}

/// `DELETE /api/pages/:id/elements/:element_id` — removes the subtree.
async fn delete_element(
    State(state): State<AppState>,
    actor: Actor,
    Path((page_id, element_id)): Path<(Uuid, String)>,
) -> ApiResult<Json<serde_json::Value>> {
    actor.require(Permission::PagesEdit)?;
    let removed = builder::delete_element(&state, page_id, &element_id).await?;
    audit(&state, &actor, "element.deleted", "page", page_id, format!("Deleted element {element_id} ({removed} nodes)")).await;
    Ok(Json(json!({ "removed": removed })))
}

#[cfg(test)]
#[path = "builder_test.rs"]
mod tests;
