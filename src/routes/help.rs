//! Help center routes — knowledge base articles and support tickets.
//!
//! Reading articles and opening tickets need no permission. Staff replies
//! and status changes need `support.manage`.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::routes::actor::Actor;
use crate::routes::extract::{Json, Path, Query};
use crate::routes::{ApiError, ApiResult, audit};
use crate::services::events::spawn_event;
use crate::services::help::{
    self, ArticleHit, CategorySummary, HelpArticle, HelpError, NewTicket, SupportTicket, TicketReply, TicketStatus,
};
use crate::services::team::Permission;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/help/categories", get(list_categories))
        .route("/api/help/articles", get(list_articles))
        .route("/api/help/search", get(search_articles))
        .route("/api/help/articles/{key}", get(get_article))
        .route("/api/help/articles/{key}/rate", post(rate_article))
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/{id}", get(get_ticket))
        .route("/api/tickets/{id}/replies", post(reply_ticket))
        .route("/api/tickets/{id}/status", patch(update_ticket_status))
}

pub(crate) fn help_error_to_status(err: &HelpError) -> StatusCode {
    match err {
        HelpError::ArticleNotFound(_) | HelpError::TicketNotFound(_) => StatusCode::NOT_FOUND,
        HelpError::TicketClosed(_) => StatusCode::CONFLICT,
        HelpError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl From<HelpError> for ApiError {
    fn from(err: HelpError) -> Self {
        Self::from_service(help_error_to_status(&err), &err)
    }
}

#[derive(Deserialize)]
pub struct CategoryFilter {
    pub category: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct RateBody {
    pub helpful: bool,
}

#[derive(Deserialize)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
}

#[derive(Deserialize)]
pub struct StatusBody {
    pub status: TicketStatus,
}

// =============================================================================
// ARTICLES
// =============================================================================

async fn list_categories(State(state): State<AppState>) -> Json<Vec<CategorySummary>> {
    Json(help::list_categories(&state).await)
}

/// `GET /api/help/articles?category=`
async fn list_articles(State(state): State<AppState>, Query(filter): Query<CategoryFilter>) -> Json<Vec<HelpArticle>> {
    Json(help::list_articles(&state, filter.category.as_deref()).await)
}

/// `GET /api/help/search?q=`
async fn search_articles(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<Vec<ArticleHit>> {
    Json(help::search_articles(&state, &params.q).await)
}

/// `GET /api/help/articles/:key` — key is an id or a slug. Counts a view.
async fn get_article(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult<Json<HelpArticle>> {
    Ok(Json(help::get_article(&state, &key).await?))
}

async fn rate_article(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<RateBody>,
) -> ApiResult<Json<HelpArticle>> {
    Ok(Json(help::rate_article(&state, &key, body.helpful).await?))
}

// =============================================================================
// TICKETS
// =============================================================================

/// `GET /api/tickets?status=`
async fn list_tickets(State(state): State<AppState>, Query(filter): Query<TicketFilter>) -> Json<Vec<SupportTicket>> {
    Json(help::list_tickets(&state, filter.status).await)
}

async fn create_ticket(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<NewTicket>,
) -> ApiResult<(StatusCode, Json<SupportTicket>)> {
    let ticket = help::create_ticket(&state, body).await?;
    audit(&state, &actor, "ticket.created", "ticket", ticket.id, format!("Opened ticket: {}", ticket.subject)).await;
    spawn_event(
        &state,
        "ticket.created",
        json!({
            "ticket_id": ticket.id,
            "subject": ticket.subject,
            "priority": ticket.priority,
            "requester": ticket.requester,
        }),
    );
    Ok((StatusCode::CREATED, Json(ticket)))
}

async fn get_ticket(State(state): State<AppState>, Path(ticket_id): Path<Uuid>) -> ApiResult<Json<SupportTicket>> {
    Ok(Json(help::get_ticket(&state, ticket_id).await?))
}

/// `POST /api/tickets/:id/replies` — staff replies need `support.manage`.
async fn reply_ticket(
    State(state): State<AppState>,
    actor: Actor,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<TicketReply>,
) -> ApiResult<Json<SupportTicket>> {
    if body.from_staff {
        actor.require(Permission::SupportManage)?;
    }
    let from = if body.from_staff { "staff" } else { "requester" };
    let ticket = help::reply_ticket(&state, ticket_id, body).await?;
    audit(&state, &actor, "ticket.replied", "ticket", ticket.id, format!("Reply from {from}")).await;
    Ok(Json(ticket))
}

async fn update_ticket_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<StatusBody>,
) -> ApiResult<Json<SupportTicket>> {
    actor.require(Permission::SupportManage)?;
    let ticket = help::update_ticket_status(&state, ticket_id, body.status).await?;
    audit(&state, &actor, "ticket.status_changed", "ticket", ticket.id, format!("Ticket moved to {:?}", ticket.status)).await;
    Ok(Json(ticket))
}

#[cfg(test)]
#[path = "help_test.rs"]
mod tests;
