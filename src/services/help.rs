//! Help service — knowledge base articles and support tickets.
//!
//! DESIGN
//! ======
//! Article search is a weighted term match: each query term scores 3 for a
//! title hit, 2 for a tag hit, and 1 for a summary or body hit. Results
//! are sorted by score, then title; articles that score zero are left out.
//!
//! Tickets accept replies until closed. A reply on a resolved ticket
//! reopens it.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::state::AppState;
use crate::util::{is_valid_email, now_ms, slugify, unique_slug};

const TITLE_WEIGHT: u32 = 3;
const TAG_WEIGHT: u32 = 2;
const TEXT_WEIGHT: u32 = 1;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum HelpError {
    #[error("article not found: {0}")]
    ArticleNotFound(String),
    #[error("ticket not found: {0}")]
    TicketNotFound(Uuid),
    #[error("ticket {0} is closed")]
    TicketClosed(Uuid),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl ErrorCode for HelpError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ArticleNotFound(_) => "E_ARTICLE_NOT_FOUND",
            Self::TicketNotFound(_) => "E_TICKET_NOT_FOUND",
            Self::TicketClosed(_) => "E_TICKET_CLOSED",
            Self::Validation(_) => "E_VALIDATION",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelpArticle {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub category: String,
    pub summary: String,
    pub body: String,
    pub tags: Vec<String>,
    pub views: u64,
    pub helpful_yes: u64,
    pub helpful_no: u64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub category: String,
    pub summary: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArticleHit {
    pub score: u32,
    pub article: HelpArticle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requester {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketMessage {
    pub id: Uuid,
    pub author: String,
    pub body: String,
    /// `true` when written by the support team rather than the requester.
    pub from_staff: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportTicket {
    pub id: Uuid,
    pub subject: String,
    pub description: String,
    pub requester: Requester,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub messages: Vec<TicketMessage>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTicket {
    pub subject: String,
    pub description: String,
    pub requester: Requester,
    #[serde(default)]
    pub priority: TicketPriority,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TicketReply {
    pub author: String,
    pub body: String,
    #[serde(default)]
    pub from_staff: bool,
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct HelpStore {
    pub articles: HashMap<Uuid, HelpArticle>,
    pub tickets: HashMap<Uuid, SupportTicket>,
}

impl HelpStore {
    /// Add an article, deriving a unique slug from its title.
    ///
    /// # Errors
    ///
    /// `Validation` if title, category, or body is blank.
    pub fn add_article(&mut self, input: NewArticle) -> Result<HelpArticle, HelpError> {
        let title = required("title", &input.title)?;
        let category = required("category", &input.category)?;
        let body = required("body", &input.body)?;
        let slug = unique_slug(&slugify(&title), |s| self.articles.values().any(|a| a.slug == s));
        let article = HelpArticle {
            id: Uuid::new_v4(),
            slug,
            title,
            category,
            summary: input.summary.trim().to_owned(),
            body,
            tags: input.tags.iter().map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()).collect(),
            views: 0,
            helpful_yes: 0,
            helpful_no: 0,
            updated_at: now_ms(),
        };
        self.articles.insert(article.id, article.clone());
        Ok(article)
    }

    fn find_article_mut(&mut self, key: &str) -> Option<&mut HelpArticle> {
        let id = Uuid::parse_str(key).ok();
        self.articles
            .values_mut()
            .find(|a| Some(a.id) == id || a.slug == key)
    }
}

fn required(field: &str, value: &str) -> Result<String, HelpError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(HelpError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_owned())
}

/// Weighted relevance of `article` for the lowercase `terms`.
#[must_use]
pub fn score_article(article: &HelpArticle, terms: &[String]) -> u32 {
    let title = article.title.to_lowercase();
    let summary = article.summary.to_lowercase();
    let body = article.body.to_lowercase();
    terms
        .iter()
        .map(|term| {
            let mut score = 0;
            if title.contains(term.as_str()) {
                score += TITLE_WEIGHT;
            }
            if article.tags.iter().any(|t| t.contains(term.as_str())) {
                score += TAG_WEIGHT;
            }
            if summary.contains(term.as_str()) || body.contains(term.as_str()) {
                score += TEXT_WEIGHT;
            }
            score
        })
        .sum()
}

// =============================================================================
// ARTICLES
// =============================================================================

/// Category names with article counts, sorted by name.
pub async fn list_categories(state: &AppState) -> Vec<CategorySummary> {
    let help = state.help.read().await;
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for article in help.articles.values() {
        *counts.entry(article.category.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(name, count)| CategorySummary { name: name.to_owned(), count })
        .collect()
}

/// Articles sorted by title, optionally limited to one category
/// (case-insensitive).
pub async fn list_articles(state: &AppState, category: Option<&str>) -> Vec<HelpArticle> {
    let help = state.help.read().await;
    let mut list: Vec<HelpArticle> = help
        .articles
        .values()
        .filter(|a| category.is_none_or(|c| a.category.eq_ignore_ascii_case(c)))
        .cloned()
        .collect();
    list.sort_by(|a, b| a.title.cmp(&b.title));
    list
}

pub async fn search_articles(state: &AppState, query: &str) -> Vec<ArticleHit> {
    let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    if terms.is_empty() {
        return Vec::new();
    }
    let help = state.help.read().await;
    let mut hits: Vec<ArticleHit> = help
        .articles
        .values()
        .filter_map(|article| {
            let score = score_article(article, &terms);
            (score > 0).then(|| ArticleHit { score, article: article.clone() })
        })
        .collect();
    hits.sort_by(|a, b| b.score.cmp(&a.score).then(a.article.title.cmp(&b.article.title)));
    hits
}

/// Look an article up by id or slug and count the view.
///
/// # Errors
///
/// `ArticleNotFound` if nothing matches.
pub async fn get_article(state: &AppState, key: &str) -> Result<HelpArticle, HelpError> {
    let mut help = state.help.write().await;
    let article = help
        .find_article_mut(key)
        .ok_or_else(|| HelpError::ArticleNotFound(key.to_owned()))?;
    article.views += 1;
    Ok(article.clone())
}

/// # Errors
///
/// `ArticleNotFound` if nothing matches.
pub async fn rate_article(state: &AppState, key: &str, helpful: bool) -> Result<HelpArticle, HelpError> {
    let mut help = state.help.write().await;
    let article = help
        .find_article_mut(key)
        .ok_or_else(|| HelpError::ArticleNotFound(key.to_owned()))?;
    if helpful {
        article.helpful_yes += 1;
    } else {
        article.helpful_no += 1;
    }
    Ok(article.clone())
}

// =============================================================================
// TICKETS
// =============================================================================

/// # Errors
///
/// `Validation` for blank fields or a malformed requester email.
pub async fn create_ticket(state: &AppState, input: NewTicket) -> Result<SupportTicket, HelpError> {
    let subject = required("subject", &input.subject)?;
    let description = required("description", &input.description)?;
    let name = required("requester name", &input.requester.name)?;
    let email = input.requester.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(HelpError::Validation(format!("invalid email: {email}")));
    }

    let now = now_ms();
    let ticket = SupportTicket {
        id: Uuid::new_v4(),
        subject,
        description,
        requester: Requester { name, email },
        priority: input.priority,
        status: TicketStatus::Open,
        messages: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    state.help.write().await.tickets.insert(ticket.id, ticket.clone());
    info!(ticket_id = %ticket.id, priority = ?ticket.priority, "ticket opened");
    Ok(ticket)
}

/// Tickets most recently updated first.
pub async fn list_tickets(state: &AppState, status: Option<TicketStatus>) -> Vec<SupportTicket> {
    let help = state.help.read().await;
    let mut list: Vec<SupportTicket> = help
        .tickets
        .values()
        .filter(|t| status.is_none_or(|s| t.status == s))
        .cloned()
        .collect();
    list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.created_at.cmp(&a.created_at)));
    list
}

/// # Errors
///
/// `TicketNotFound` if no ticket has this id.
pub async fn get_ticket(state: &AppState, ticket_id: Uuid) -> Result<SupportTicket, HelpError> {
    let help = state.help.read().await;
    help.tickets
        .get(&ticket_id)
        .cloned()
        .ok_or(HelpError::TicketNotFound(ticket_id))
}

/// # Errors
///
/// `TicketNotFound`, `TicketClosed`, or `Validation` for a blank reply.
pub async fn reply_ticket(state: &AppState, ticket_id: Uuid, reply: TicketReply) -> Result<SupportTicket, HelpError> {
    let author = required("author", &reply.author)?;
    let body = required("body", &reply.body)?;
    let mut help = state.help.write().await;
    let ticket = help
        .tickets
        .get_mut(&ticket_id)
        .ok_or(HelpError::TicketNotFound(ticket_id))?;
    if ticket.status == TicketStatus::Closed {
        return Err(HelpError::TicketClosed(ticket_id));
    }
    if ticket.status == TicketStatus::Resolved {
        ticket.status = TicketStatus::Open;
    }
    let now = now_ms();
    ticket.messages.push(TicketMessage { id: Uuid::new_v4(), author, body, from_staff: reply.from_staff, created_at: now });
    ticket.updated_at = now;
    Ok(ticket.clone())
}

/// # Errors
///
/// `TicketNotFound` if no ticket has this id.
pub async fn update_ticket_status(state: &AppState, ticket_id: Uuid, status: TicketStatus) -> Result<SupportTicket, HelpError> {
    let mut help = state.help.write().await;
    let ticket = help
        .tickets
        .get_mut(&ticket_id)
        .ok_or(HelpError::TicketNotFound(ticket_id))?;
    ticket.status = status;
    ticket.updated_at = now_ms();
    info!(%ticket_id, ?status, "ticket status changed");
    Ok(ticket.clone())
}

#[cfg(test)]
#[path = "help_test.rs"]
mod tests;
