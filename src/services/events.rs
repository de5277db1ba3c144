//! Event bus — fans a catalog event out to webhooks and workflows.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::webhook::{self, DeliveryRecord, is_known_event};
use crate::services::workflow::{self, WorkflowRun};
use crate::state::AppState;

#[derive(Debug, Clone, Default, Serialize)]
pub struct EventReport {
    pub deliveries: Vec<(Uuid, DeliveryRecord)>,
    pub runs: Vec<WorkflowRun>,
}

/// Deliver `event` to every active subscribed webhook, then run every
/// active workflow it triggers. Events outside the catalog are dropped.
pub async fn emit_event(state: &AppState, event: &str, payload: Value) -> EventReport {
    if !is_known_event(event) {
        warn!(%event, "dropping event outside the catalog");
        return EventReport::default();
    }
    let deliveries = webhook::deliver_event(state, event, &payload).await;
    let runs = workflow::run_for_event(state, event, &payload).await;
    debug!(%event, deliveries = deliveries.len(), runs = runs.len(), "event emitted");
    EventReport { deliveries, runs }
}

/// Fire-and-forget variant for request handlers: the response does not
/// wait on simulated deliveries.
pub fn spawn_event(state: &AppState, event: &'static str, payload: Value) {
    let state = state.clone();
    tokio::spawn(async move {
        emit_event(&state, event, payload).await;
    });
}
