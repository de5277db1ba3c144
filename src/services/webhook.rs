//! Webhook service — endpoint registry, test sends, event fan-out.
//!
//! DESIGN
//! ======
//! Deliveries snapshot the target endpoints under the read lock, release it,
//! send through the configured `WebhookDispatcher`, then record each outcome
//! in the webhook's bounded delivery history. An endpoint deleted mid-send
//! simply loses its record.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::services::dispatch::{DeliveryOutcome, DeliveryRequest};
use crate::state::AppState;
use crate::util::{generate_secret, now_ms};

pub const SECRET_PREFIX: &str = "whsec_";
pub const TEST_EVENT: &str = "webhook.test";

/// Events a webhook or workflow trigger may subscribe to.
pub const EVENT_CATALOG: &[&str] = &[
    "order.created",
    "order.updated",
    "product.created",
    "product.updated",
    "page.published",
    "member.invited",
    "ticket.created",
    "domain.connected",
];

#[must_use]
pub fn is_known_event(event: &str) -> bool {
    EVENT_CATALOG.contains(&event)
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook not found: {0}")]
    NotFound(Uuid),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("unknown event: {0}")]
    UnknownEvent(String),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl ErrorCode for WebhookError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_WEBHOOK_NOT_FOUND",
            Self::InvalidUrl(_) => "E_INVALID_URL",
            Self::UnknownEvent(_) => "E_UNKNOWN_EVENT",
            Self::Validation(_) => "E_VALIDATION",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: Uuid,
    pub event: String,
    pub success: bool,
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub delivered_at: i64,
}

impl DeliveryRecord {
    fn from_outcome(event: &str, outcome: DeliveryOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            event: event.to_owned(),
            success: outcome.success,
            status_code: outcome.status_code,
            latency_ms: outcome.latency_ms,
            error: outcome.error,
            delivered_at: now_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    pub secret: String,
    pub active: bool,
    /// Most recent first, bounded by `DELIVERY_HISTORY_LIMIT`.
    pub deliveries: VecDeque<DeliveryRecord>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Webhook {
    #[must_use]
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWebhook {
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub active: Option<bool>,
}

pub type WebhookStore = HashMap<Uuid, Webhook>;

// =============================================================================
// VALIDATION
// =============================================================================

fn validate_url(raw: &str) -> Result<String, WebhookError> {
    let parsed = reqwest::Url::parse(raw.trim()).map_err(|_| WebhookError::InvalidUrl(raw.to_owned()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(WebhookError::InvalidUrl(raw.to_owned()));
    }
    Ok(parsed.to_string())
}

fn validate_events(events: &[String]) -> Result<Vec<String>, WebhookError> {
    if events.is_empty() {
        return Err(WebhookError::Validation("at least one event is required".into()));
    }
    let mut out: Vec<String> = Vec::with_capacity(events.len());
    for event in events {
        let event = event.trim();
        if !is_known_event(event) {
            return Err(WebhookError::UnknownEvent(event.to_owned()));
        }
        if !out.iter().any(|e| e == event) {
            out.push(event.to_owned());
        }
    }
    Ok(out)
}

fn validate_name(name: &str) -> Result<String, WebhookError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(WebhookError::Validation("name is required".into()));
    }
    Ok(trimmed.to_owned())
}

// =============================================================================
// CRUD
// =============================================================================

/// # Errors
///
/// `Validation`, `InvalidUrl`, or `UnknownEvent`.
pub async fn create_webhook(state: &AppState, input: NewWebhook) -> Result<Webhook, WebhookError> {
    let name = validate_name(&input.name)?;
    let url = validate_url(&input.url)?;
    let events = validate_events(&input.events)?;

    let now = now_ms();
    let webhook = Webhook {
        id: Uuid::new_v4(),
        name,
        url,
        events,
        secret: generate_secret(SECRET_PREFIX),
        active: input.active,
        deliveries: VecDeque::new(),
        created_at: now,
        updated_at: now,
    };
    state.webhooks.write().await.insert(webhook.id, webhook.clone());
    info!(webhook_id = %webhook.id, url = %webhook.url, "webhook created");
    Ok(webhook)
}

/// All webhooks, oldest first.
pub async fn list_webhooks(state: &AppState) -> Vec<Webhook> {
    let hooks = state.webhooks.read().await;
    let mut list: Vec<Webhook> = hooks.values().cloned().collect();
    list.sort_by_key(|w| (w.created_at, w.id));
    list
}

/// # Errors
///
/// `NotFound` if no webhook has this id.
pub async fn get_webhook(state: &AppState, webhook_id: Uuid) -> Result<Webhook, WebhookError> {
    let hooks = state.webhooks.read().await;
    hooks
        .get(&webhook_id)
        .cloned()
        .ok_or(WebhookError::NotFound(webhook_id))
}

/// # Errors
///
/// `NotFound`, `Validation`, `InvalidUrl`, or `UnknownEvent`.
pub async fn update_webhook(state: &AppState, webhook_id: Uuid, patch: WebhookPatch) -> Result<Webhook, WebhookError> {
    let name = patch.name.as_deref().map(validate_name).transpose()?;
    let url = patch.url.as_deref().map(validate_url).transpose()?;
    let events = patch.events.as_deref().map(validate_events).transpose()?;

    let mut hooks = state.webhooks.write().await;
    let hook = hooks
        .get_mut(&webhook_id)
        .ok_or(WebhookError::NotFound(webhook_id))?;
    if let Some(name) = name {
        hook.name = name;
    }
    if let Some(url) = url {
        hook.url = url;
    }
    if let Some(events) = events {
        hook.events = events;
    }
    if let Some(active) = patch.active {
        hook.active = active;
    }
    hook.updated_at = now_ms();
    info!(%webhook_id, active = hook.active, "webhook updated");
    Ok(hook.clone())
}

/// # Errors
///
/// `NotFound` if no webhook has this id.
pub async fn delete_webhook(state: &AppState, webhook_id: Uuid) -> Result<Webhook, WebhookError> {
    let mut hooks = state.webhooks.write().await;
    let hook = hooks
        .remove(&webhook_id)
        .ok_or(WebhookError::NotFound(webhook_id))?;
    info!(%webhook_id, "webhook deleted");
    Ok(hook)
}

/// Replace the signing secret. The old secret stops validating immediately.
///
/// # Errors
///
/// `NotFound` if no webhook has this id.
pub async fn rotate_secret(state: &AppState, webhook_id: Uuid) -> Result<Webhook, WebhookError> {
    let mut hooks = state.webhooks.write().await;
    let hook = hooks
        .get_mut(&webhook_id)
        .ok_or(WebhookError::NotFound(webhook_id))?;
    hook.secret = generate_secret(SECRET_PREFIX);
    hook.updated_at = now_ms();
    info!(%webhook_id, "webhook secret rotated");
    Ok(hook.clone())
}

// =============================================================================
// DELIVERY
// =============================================================================

struct Target {
    id: Uuid,
    url: String,
    secret: String,
}

async fn send_and_record(state: &AppState, targets: Vec<Target>, event: &str, payload: &serde_json::Value) -> Vec<(Uuid, DeliveryRecord)> {
    let mut results = Vec::with_capacity(targets.len());
    for target in targets {
        let outcome = state
            .dispatcher
            .deliver(DeliveryRequest { url: &target.url, secret: &target.secret, event, payload })
            .await;
        if !outcome.success {
            warn!(webhook_id = %target.id, %event, error = ?outcome.error, "webhook delivery unsuccessful");
        }
        results.push((target.id, DeliveryRecord::from_outcome(event, outcome)));
    }

    let limit = state.config.delivery_history_limit;
    let mut hooks = state.webhooks.write().await;
    for (id, record) in &results {
        if let Some(hook) = hooks.get_mut(id) {
            hook.deliveries.push_front(record.clone());
            hook.deliveries.truncate(limit);
        }
    }
    results
}

/// Send a `webhook.test` sample payload to one endpoint, active or not.
///
/// # Errors
///
/// `NotFound` if no webhook has this id.
pub async fn test_webhook(state: &AppState, webhook_id: Uuid) -> Result<DeliveryRecord, WebhookError> {
    let hook = get_webhook(state, webhook_id).await?;
    let payload = json!({
        "webhook_id": hook.id,
        "message": "This is a test delivery.",
    });
    let target = Target { id: hook.id, url: hook.url, secret: hook.secret };
    let mut results = send_and_record(state, vec![target], TEST_EVENT, &payload).await;
    results
        .pop()
        .map(|(_, record)| record)
        .ok_or(WebhookError::NotFound(webhook_id))
}

/// Deliver `event` to every active webhook subscribed to it.
pub async fn deliver_event(state: &AppState, event: &str, payload: &serde_json::Value) -> Vec<(Uuid, DeliveryRecord)> {
    let targets: Vec<Target> = {
        let hooks = state.webhooks.read().await;
        hooks
            .values()
            .filter(|h| h.active && h.subscribes_to(event))
            .map(|h| Target { id: h.id, url: h.url.clone(), secret: h.secret.clone() })
            .collect()
    };
    if targets.is_empty() {
        return Vec::new();
    }
    send_and_record(state, targets, event, payload).await
}

#[cfg(test)]
#[path = "webhook_test.rs"]
mod tests;
