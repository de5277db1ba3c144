//! Workflow service — trigger, condition, and action automations.
//!
//! DESIGN
//! ======
//! A workflow listens for one catalog event. When the event fires, every
//! condition is evaluated against the event payload (dotted-path lookup);
//! if all hold, actions run in order through the simulator. The first
//! failing action ends the run and the remaining actions are recorded as
//! not attempted. Runs are kept newest first in a bounded history.
//!
//! Manual `execute_workflow` runs ignore the `active` flag; event-driven
//! runs (`run_for_event`) only touch active workflows.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ErrorCode;
use crate::services::webhook::is_known_event;
use crate::state::AppState;
use crate::util::now_ms;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("workflow not found: {0}")]
    NotFound(Uuid),
    #[error("unknown trigger event: {0}")]
    UnknownEvent(String),
    #[error("validation failed: {0}")]
    Validation(String),
}

impl ErrorCode for WorkflowError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_WORKFLOW_NOT_FOUND",
            Self::UnknownEvent(_) => "E_UNKNOWN_EVENT",
            Self::Validation(_) => "E_VALIDATION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub event: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    GreaterThan,
    LessThan,
    Exists,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the event payload, e.g. `order.total_cents`.
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SendEmail,
    SendWebhook,
    UpdateRecord,
    Notify,
    Delay,
}

impl ActionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SendEmail => "send_email",
            Self::SendWebhook => "send_webhook",
            Self::UpdateRecord => "update_record",
            Self::Notify => "notify",
            Self::Delay => "delay",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowAction {
    pub kind: ActionKind,
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Succeeded,
    Failed,
    NotAttempted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub kind: ActionKind,
    pub status: ActionStatus,
    pub latency_ms: u64,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// `None` for manual runs.
    pub event: Option<String>,
    pub status: RunStatus,
    pub action_results: Vec<ActionResult>,
    pub started_at: i64,
    pub finished_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub trigger: Trigger,
    pub conditions: Vec<Condition>,
    pub actions: Vec<WorkflowAction>,
    pub active: bool,
    pub run_count: u64,
    pub last_run_at: Option<i64>,
    pub runs: VecDeque<WorkflowRun>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWorkflow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger: Trigger,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub actions: Vec<WorkflowAction>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkflowPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub trigger: Option<Trigger>,
    pub conditions: Option<Vec<Condition>>,
    pub actions: Option<Vec<WorkflowAction>>,
}

pub type WorkflowStore = HashMap<Uuid, Workflow>;

// =============================================================================
// CONDITIONS
// =============================================================================

/// Follow a dotted path through objects (by key) and arrays (by index).
#[must_use]
pub fn resolve_path<'a>(payload: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(payload, |node, segment| match node {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
        _ => matches!((as_number(left), as_number(right)), (Some(a), Some(b)) if (a - b).abs() < f64::EPSILON),
    }
}

/// Whether `condition` holds for `payload`. A missing field fails every
/// operator except `not_equals`.
#[must_use]
pub fn evaluate_condition(condition: &Condition, payload: &Value) -> bool {
    let actual = resolve_path(payload, &condition.field).filter(|v| !v.is_null());
    let expected = &condition.value;
    match condition.operator {
        ConditionOperator::Exists => actual.is_some(),
        ConditionOperator::Equals => actual.is_some_and(|a| loosely_equal(a, expected)),
        ConditionOperator::NotEquals => actual.is_none_or(|a| !loosely_equal(a, expected)),
        ConditionOperator::Contains => actual.is_some_and(|a| match a {
            Value::String(s) => expected
                .as_str()
                .is_some_and(|needle| s.to_lowercase().contains(&needle.to_lowercase())),
            Value::Array(items) => items.iter().any(|item| loosely_equal(item, expected)),
            _ => false,
        }),
        ConditionOperator::GreaterThan => {
            matches!((actual.and_then(as_number), as_number(expected)), (Some(a), Some(b)) if a > b)
        }
        ConditionOperator::LessThan => {
            matches!((actual.and_then(as_number), as_number(expected)), (Some(a), Some(b)) if a < b)
        }
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

fn validate_name(name: &str) -> Result<String, WorkflowError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::Validation("name is required".into()));
    }
    Ok(trimmed.to_owned())
}

fn validate_trigger(trigger: &Trigger) -> Result<Trigger, WorkflowError> {
    let event = trigger.event.trim();
    if !is_known_event(event) {
        return Err(WorkflowError::UnknownEvent(event.to_owned()));
    }
    Ok(Trigger { event: event.to_owned() })
}

fn validate_conditions(conditions: &[Condition]) -> Result<(), WorkflowError> {
    if conditions.iter().any(|c| c.field.trim().is_empty()) {
        return Err(WorkflowError::Validation("condition field is required".into()));
    }
    Ok(())
}

fn validate_actions(actions: &[WorkflowAction]) -> Result<(), WorkflowError> {
    if actions.is_empty() {
        return Err(WorkflowError::Validation("at least one action is required".into()));
    }
    Ok(())
}

// =============================================================================
// CRUD
// =============================================================================

/// # Errors
///
/// `Validation` for a blank name, bad conditions, or no actions;
/// `UnknownEvent` for a trigger outside the catalog.
pub async fn create_workflow(state: &AppState, input: NewWorkflow) -> Result<Workflow, WorkflowError> {
    let name = validate_name(&input.name)?;
    let trigger = validate_trigger(&input.trigger)?;
    validate_conditions(&input.conditions)?;
    validate_actions(&input.actions)?;

    let now = now_ms();
    let workflow = Workflow {
        id: Uuid::new_v4(),
        name,
        description: input.description.trim().to_owned(),
        trigger,
        conditions: input.conditions,
        actions: input.actions,
        active: input.active,
        run_count: 0,
        last_run_at: None,
        runs: VecDeque::new(),
        created_at: now,
        updated_at: now,
    };
    state.workflows.write().await.insert(workflow.id, workflow.clone());
    info!(workflow_id = %workflow.id, trigger = %workflow.trigger.event, "workflow created");
    Ok(workflow)
}

/// All workflows, oldest first.
pub async fn list_workflows(state: &AppState) -> Vec<Workflow> {
    let flows = state.workflows.read().await;
    let mut list: Vec<Workflow> = flows.values().cloned().collect();
    list.sort_by_key(|w| (w.created_at, w.id));
    list
}

/// # Errors
///
/// `NotFound` if no workflow has this id.
pub async fn get_workflow(state: &AppState, workflow_id: Uuid) -> Result<Workflow, WorkflowError> {
    let flows = state.workflows.read().await;
    flows
        .get(&workflow_id)
        .cloned()
        .ok_or(WorkflowError::NotFound(workflow_id))
}

/// # Errors
///
/// `NotFound`, `Validation`, or `UnknownEvent`.
pub async fn update_workflow(state: &AppState, workflow_id: Uuid, patch: WorkflowPatch) -> Result<Workflow, WorkflowError> {
    let name = patch.name.as_deref().map(validate_name).transpose()?;
    let trigger = patch.trigger.as_ref().map(validate_trigger).transpose()?;
    if let Some(conditions) = &patch.conditions {
        validate_conditions(conditions)?;
    }
    if let Some(actions) = &patch.actions {
        validate_actions(actions)?;
    }

    let mut flows = state.workflows.write().await;
    let flow = flows
        .get_mut(&workflow_id)
        .ok_or(WorkflowError::NotFound(workflow_id))?;
    if let Some(name) = name {
        flow.name = name;
    }
    if let Some(description) = patch.description {
        flow.description = description.trim().to_owned();
    }
    if let Some(trigger) = trigger {
        flow.trigger = trigger;
    }
    if let Some(conditions) = patch.conditions {
        flow.conditions = conditions;
    }
    if let Some(actions) = patch.actions {
        flow.actions = actions;
    }
    flow.updated_at = now_ms();
    info!(%workflow_id, actions = flow.actions.len(), "workflow updated");
    Ok(flow.clone())
}

/// # Errors
///
/// `NotFound` if no workflow has this id.
pub async fn delete_workflow(state: &AppState, workflow_id: Uuid) -> Result<Workflow, WorkflowError> {
    let mut flows = state.workflows.write().await;
    let flow = flows
        .remove(&workflow_id)
        .ok_or(WorkflowError::NotFound(workflow_id))?;
    info!(%workflow_id, "workflow deleted");
    Ok(flow)
}

/// # Errors
///
/// `NotFound` if no workflow has this id.
pub async fn set_active(state: &AppState, workflow_id: Uuid, active: bool) -> Result<Workflow, WorkflowError> {
    let mut flows = state.workflows.write().await;
    let flow = flows
        .get_mut(&workflow_id)
        .ok_or(WorkflowError::NotFound(workflow_id))?;
    flow.active = active;
    flow.updated_at = now_ms();
    info!(%workflow_id, active, "workflow toggled");
    Ok(flow.clone())
}

// =============================================================================
// EXECUTION
// =============================================================================

async fn run_actions(state: &AppState, actions: &[WorkflowAction]) -> (RunStatus, Vec<ActionResult>) {
    let mut results = Vec::with_capacity(actions.len());
    let mut failed = false;
    for action in actions {
        if failed {
            results.push(ActionResult { kind: action.kind, status: ActionStatus::NotAttempted, latency_ms: 0, message: None });
            continue;
        }
        // A delay step only waits; it cannot fail.
        if action.kind == ActionKind::Delay {
            state.simulator.delay().await;
            let latency_ms = u64::try_from(state.simulator.latency().as_millis()).unwrap_or(u64::MAX);
            results.push(ActionResult { kind: action.kind, status: ActionStatus::Succeeded, latency_ms, message: None });
            continue;
        }
        let outcome = state.simulator.call().await;
        let (status, message) = if outcome.success {
            (ActionStatus::Succeeded, None)
        } else {
            failed = true;
            (ActionStatus::Failed, Some(format!("{} failed", action.kind.as_str())))
        };
        results.push(ActionResult { kind: action.kind, status, latency_ms: outcome.latency_ms, message });
    }
    let status = if failed { RunStatus::Failed } else { RunStatus::Succeeded };
    (status, results)
}

async fn run_workflow(state: &AppState, flow: Workflow, event: Option<&str>, payload: &Value) -> WorkflowRun {
    let started_at = now_ms();
    let conditions_hold = flow.conditions.iter().all(|c| evaluate_condition(c, payload));
    let (status, action_results) = if conditions_hold {
        run_actions(state, &flow.actions).await
    } else {
        (RunStatus::Skipped, Vec::new())
    };

    let run = WorkflowRun {
        id: Uuid::new_v4(),
        workflow_id: flow.id,
        event: event.map(str::to_owned),
        status,
        action_results,
        started_at,
        finished_at: now_ms(),
    };
    if status == RunStatus::Failed {
        warn!(workflow_id = %flow.id, run_id = %run.id, "workflow run failed");
    }

    let limit = state.config.workflow_run_history_limit;
    let mut flows = state.workflows.write().await;
    if let Some(stored) = flows.get_mut(&flow.id) {
        if status != RunStatus::Skipped {
            stored.run_count += 1;
            stored.last_run_at = Some(run.finished_at);
        }
        stored.runs.push_front(run.clone());
        stored.runs.truncate(limit);
    }
    run
}

/// Run one workflow against `payload` now, regardless of its active flag.
///
/// # Errors
///
/// `NotFound` if no workflow has this id.
pub async fn execute_workflow(state: &AppState, workflow_id: Uuid, payload: &Value) -> Result<WorkflowRun, WorkflowError> {
    let flow = get_workflow(state, workflow_id).await?;
    info!(%workflow_id, "workflow executed manually");
    Ok(run_workflow(state, flow, None, payload).await)
}

/// Run every active workflow triggered by `event`.
pub async fn run_for_event(state: &AppState, event: &str, payload: &Value) -> Vec<WorkflowRun> {
    let matching: Vec<Workflow> = {
        let flows = state.workflows.read().await;
        let mut list: Vec<Workflow> = flows
            .values()
            .filter(|w| w.active && w.trigger.event == event)
            .cloned()
            .collect();
        list.sort_by_key(|w| (w.created_at, w.id));
        list
    };
    let mut runs = Vec::with_capacity(matching.len());
    for flow in matching {
        runs.push(run_workflow(state, flow, Some(event), payload).await);
    }
    runs
}

#[cfg(test)]
#[path = "workflow_test.rs"]
mod tests;
