//! Audit log — bounded, append-only record of who changed what.
//!
//! DESIGN
//! ======
//! Entries live in a ring buffer sized by `AUDIT_CAPACITY`; when full, the
//! oldest entry is dropped. Queries return newest first. CSV export runs
//! the same filters with no pagination.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::state::AppState;
use crate::util::now_ms;

pub const SYSTEM_ACTOR: &str = "system";
pub const DEFAULT_QUERY_LIMIT: usize = 100;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit entry not found: {0}")]
    NotFound(Uuid),
    #[error("export failed: {0}")]
    Export(String),
}

impl ErrorCode for AuditError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_AUDIT_NOT_FOUND",
            Self::Export(_) => "E_EXPORT_FAILED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: i64,
    /// Display name of whoever acted, or `system`.
    pub actor: String,
    pub actor_id: Option<Uuid>,
    /// Dotted verb, e.g. `page.published`.
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub description: String,
    pub severity: Severity,
}

/// Input for `record`. The log assigns the id and timestamp.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub actor: String,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub description: String,
    pub severity: Severity,
}

impl NewAuditEntry {
    #[must_use]
    pub fn system(action: &str, resource_type: &str, resource_id: impl ToString, description: impl Into<String>) -> Self {
        Self {
            actor: SYSTEM_ACTOR.to_owned(),
            actor_id: None,
            action: action.to_owned(),
            resource_type: resource_type.to_owned(),
            resource_id: resource_id.to_string(),
            description: description.into(),
            severity: Severity::Info,
        }
    }

    #[must_use]
    pub fn by(mut self, actor: impl Into<String>, actor_id: Option<Uuid>) -> Self {
        self.actor = actor.into();
        self.actor_id = actor_id;
        self
    }

    #[must_use]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub actor: Option<String>,
    /// Exact action, or a prefix ending in `.` such as `page.`.
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub severity: Option<Severity>,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    /// Matches before pagination.
    pub total: usize,
}

// =============================================================================
// STORE
// =============================================================================

#[derive(Debug, Clone)]
pub struct AuditLog {
    entries: VecDeque<AuditEntry>,
    capacity: usize,
}

impl AuditLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { entries: VecDeque::new(), capacity: capacity.max(1) }
    }

    pub fn push(&mut self, entry: AuditEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn matching<'a>(&'a self, query: &'a AuditQuery) -> impl Iterator<Item = &'a AuditEntry> + 'a {
        let needle = query.search.as_deref().map(str::to_lowercase);
        self.entries
            .iter()
            .rev()
            .filter(move |e| entry_matches(e, query, needle.as_deref()))
    }
}

fn entry_matches(entry: &AuditEntry, query: &AuditQuery, needle: Option<&str>) -> bool {
    if let Some(actor) = &query.actor
        && !entry.actor.eq_ignore_ascii_case(actor)
    {
        return false;
    }
    if let Some(action) = &query.action {
        let hit = if action.ends_with('.') { entry.action.starts_with(action.as_str()) } else { entry.action == *action };
        if !hit {
            return false;
        }
    }
    if query
        .resource_type
        .as_deref()
        .is_some_and(|t| entry.resource_type != t)
    {
        return false;
    }
    if query.severity.is_some_and(|s| entry.severity != s) {
        return false;
    }
    if query.since.is_some_and(|t| entry.timestamp < t) || query.until.is_some_and(|t| entry.timestamp > t) {
        return false;
    }
    needle.is_none_or(|n| {
        entry.description.to_lowercase().contains(n)
            || entry.action.contains(n)
            || entry.resource_id.to_lowercase().contains(n)
            || entry.actor.to_lowercase().contains(n)
    })
}

// =============================================================================
// OPERATIONS
// =============================================================================

pub async fn record(state: &AppState, input: NewAuditEntry) -> AuditEntry {
    let entry = AuditEntry {
        id: Uuid::new_v4(),
        timestamp: now_ms(),
        actor: input.actor,
        actor_id: input.actor_id,
        action: input.action,
        resource_type: input.resource_type,
        resource_id: input.resource_id,
        description: input.description,
        severity: input.severity,
    };
    debug!(entry_id = %entry.id, action = %entry.action, "audit entry recorded");
    state.audit.write().await.push(entry.clone());
    entry
}

/// Filtered entries, newest first, paginated by `limit` (default 100) and
/// `offset`.
pub async fn query(state: &AppState, query: &AuditQuery) -> AuditPage {
    let log = state.audit.read().await;
    let total = log.matching(query).count();
    let entries = log
        .matching(query)
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(DEFAULT_QUERY_LIMIT))
        .cloned()
        .collect();
    AuditPage { entries, total }
}

/// # Errors
///
/// `NotFound` if the entry never existed or has rotated out.
pub async fn get_entry(state: &AppState, entry_id: Uuid) -> Result<AuditEntry, AuditError> {
    let log = state.audit.read().await;
    log.entries
        .iter()
        .find(|e| e.id == entry_id)
        .cloned()
        .ok_or(AuditError::NotFound(entry_id))
}

/// All matching entries as CSV, newest first. `limit` and `offset` are
/// ignored.
///
/// # Errors
///
/// `Export` if the CSV writer fails.
pub async fn export_csv(state: &AppState, query: &AuditQuery) -> Result<String, AuditError> {
    let log = state.audit.read().await;
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["timestamp", "actor", "action", "resource_type", "resource_id", "severity", "description"])
        .map_err(|e| AuditError::Export(e.to_string()))?;
    for entry in log.matching(query) {
        let timestamp = entry.timestamp.to_string();
        writer
            .write_record([
                timestamp.as_str(),
                entry.actor.as_str(),
                entry.action.as_str(),
                entry.resource_type.as_str(),
                entry.resource_id.as_str(),
                entry.severity.as_str(),
                entry.description.as_str(),
            ])
            .map_err(|e| AuditError::Export(e.to_string()))?;
    }
    let bytes = writer.into_inner().map_err(|e| AuditError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| AuditError::Export(e.to_string()))
}

#[cfg(test)]
#[path = "audit_test.rs"]
mod tests;
