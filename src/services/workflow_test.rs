use super::*;
use serde_json::json;

use crate::services::simulate::Simulator;
use crate::state::test_helpers;

fn action(kind: ActionKind) -> WorkflowAction {
    WorkflowAction { kind, config: serde_json::Map::new() }
}

fn condition(field: &str, operator: ConditionOperator, value: Value) -> Condition {
    Condition { field: field.into(), operator, value }
}

fn new_flow(event: &str, conditions: Vec<Condition>, actions: Vec<WorkflowAction>) -> NewWorkflow {
    NewWorkflow {
        name: "Big order alert".into(),
        description: String::new(),
        trigger: Trigger { event: event.into() },
        conditions,
        actions,
        active: true,
    }
}

// =============================================================================
// CONDITIONS
// =============================================================================

#[test]
fn resolve_path_walks_objects_and_arrays() {
    let payload = json!({"order": {"items": [{"sku": "T-1"}], "total_cents": 5000}});
    assert_eq!(resolve_path(&payload, "order.total_cents"), Some(&json!(5000)));
    assert_eq!(resolve_path(&payload, "order.items.0.sku"), Some(&json!("T-1")));
    assert_eq!(resolve_path(&payload, "order.missing"), None);
    assert_eq!(resolve_path(&payload, "order.items.9"), None);
}

#[test]
fn operators() {
    let payload = json!({"total": 120, "status": "Pending", "tags": ["vip", "gift"], "note": "Leave at door", "gone": null});
    let cases = [
        (condition("status", ConditionOperator::Equals, json!("pending")), true),
        (condition("total", ConditionOperator::Equals, json!("120")), true),
        (condition("status", ConditionOperator::NotEquals, json!("shipped")), true),
        (condition("missing", ConditionOperator::NotEquals, json!("x")), true),
        (condition("note", ConditionOperator::Contains, json!("DOOR")), true),
        (condition("tags", ConditionOperator::Contains, json!("vip")), true),
        (condition("tags", ConditionOperator::Contains, json!("rush")), false),
        (condition("total", ConditionOperator::GreaterThan, json!(100)), true),
        (condition("total", ConditionOperator::LessThan, json!(100)), false),
        (condition("status", ConditionOperator::GreaterThan, json!(1)), false),
        (condition("total", ConditionOperator::Exists, Value::Null), true),
        (condition("gone", ConditionOperator::Exists, Value::Null), false),
        (condition("missing", ConditionOperator::Equals, json!("x")), false),
    ];
    for (cond, expected) in cases {
        assert_eq!(evaluate_condition(&cond, &payload), expected, "{cond:?}");
    }
}

#[test]
fn condition_deserializes_snake_case() {
    let cond: Condition = serde_json::from_value(json!({"field": "a", "operator": "greater_than", "value": 3})).unwrap();
    assert_eq!(cond.operator, ConditionOperator::GreaterThan);
}

// =============================================================================
// CRUD
// =============================================================================

#[tokio::test]
async fn create_requires_actions_and_known_trigger() {
    let state = test_helpers::test_app_state();
    let err = create_workflow(&state, new_flow("order.created", vec![], vec![])).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Validation(_)));

    let err = create_workflow(&state, new_flow("cart.abandoned", vec![], vec![action(ActionKind::Notify)]))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::UnknownEvent(_)));
}

#[tokio::test]
async fn update_toggle_delete() {
    let state = test_helpers::test_app_state();
    let flow = create_workflow(&state, new_flow("order.created", vec![], vec![action(ActionKind::Notify)]))
        .await
        .unwrap();

    let patch = WorkflowPatch { name: Some("Renamed".into()), ..WorkflowPatch::default() };
    assert_eq!(update_workflow(&state, flow.id, patch).await.unwrap().name, "Renamed");
    assert!(!set_active(&state, flow.id, false).await.unwrap().active);

    delete_workflow(&state, flow.id).await.unwrap();
    assert!(list_workflows(&state).await.is_empty());
    assert!(matches!(get_workflow(&state, flow.id).await, Err(WorkflowError::NotFound(_))));
}

// =============================================================================
// EXECUTION
// =============================================================================

#[tokio::test]
async fn execute_runs_all_actions() {
    let state = test_helpers::test_app_state();
    let actions = vec![action(ActionKind::SendEmail), action(ActionKind::Delay), action(ActionKind::Notify)];
    let flow = create_workflow(&state, new_flow("order.created", vec![], actions)).await.unwrap();

    let run = execute_workflow(&state, flow.id, &json!({})).await.unwrap();
    assert_eq!(run.status, RunStatus::Succeeded);
    assert!(run.action_results.iter().all(|r| r.status == ActionStatus::Succeeded));

    let stored = get_workflow(&state, flow.id).await.unwrap();
    assert_eq!(stored.run_count, 1);
    assert!(stored.last_run_at.is_some());
    assert_eq!(stored.runs.len(), 1);
}

#[tokio::test]
async fn first_failure_stops_the_run() {
    let state = test_helpers::test_app_state_with_simulator(Simulator::failing());
    let actions = vec![action(ActionKind::Delay), action(ActionKind::SendEmail), action(ActionKind::Notify)];
    let flow = create_workflow(&state, new_flow("order.created", vec![], actions)).await.unwrap();

    let run = execute_workflow(&state, flow.id, &json!({})).await.unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    let statuses: Vec<ActionStatus> = run.action_results.iter().map(|r| r.status).collect();
    assert_eq!(statuses, [ActionStatus::Succeeded, ActionStatus::Failed, ActionStatus::NotAttempted]);
}

#[tokio::test]
async fn unmet_conditions_skip() {
    let state = test_helpers::test_app_state();
    let conditions = vec![condition("total_cents", ConditionOperator::GreaterThan, json!(10_000))];
    let flow = create_workflow(&state, new_flow("order.created", conditions, vec![action(ActionKind::Notify)]))
        .await
        .unwrap();

    let run = execute_workflow(&state, flow.id, &json!({"total_cents": 500})).await.unwrap();
    assert_eq!(run.status, RunStatus::Skipped);
    assert!(run.action_results.is_empty());

    let stored = get_workflow(&state, flow.id).await.unwrap();
    assert_eq!(stored.run_count, 0);
    assert_eq!(stored.runs.len(), 1);
}

#[tokio::test]
async fn run_for_event_only_runs_active_matching_workflows() {
    let state = test_helpers::test_app_state();
    let on_order = create_workflow(&state, new_flow("order.created", vec![], vec![action(ActionKind::Notify)]))
        .await
        .unwrap();
    create_workflow(&state, new_flow("page.published", vec![], vec![action(ActionKind::Notify)]))
        .await
        .unwrap();
    let mut paused = new_flow("order.created", vec![], vec![action(ActionKind::Notify)]);
    paused.active = false;
    create_workflow(&state, paused).await.unwrap();

    let runs = run_for_event(&state, "order.created", &json!({})).await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].workflow_id, on_order.id);
    assert_eq!(runs[0].event.as_deref(), Some("order.created"));
}

#[tokio::test]
async fn run_history_is_bounded() {
    let state = test_helpers::test_app_state();
    let limit = state.config.workflow_run_history_limit;
    let flow = create_workflow(&state, new_flow("order.created", vec![], vec![action(ActionKind::Notify)]))
        .await
        .unwrap();
    for _ in 0..limit + 2 {
        execute_workflow(&state, flow.id, &json!({})).await.unwrap();
    }
    let stored = get_workflow(&state, flow.id).await.unwrap();
    assert_eq!(stored.runs.len(), limit);
    assert_eq!(stored.run_count, u64::try_from(limit + 2).unwrap());
}
