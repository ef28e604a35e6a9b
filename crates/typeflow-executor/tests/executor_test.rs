//! End-to-end executor tests over an in-memory store.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use typeflow_executor::{EngineConfig, ExecutionEngine};
use typeflow_model::{ExecutionStatus, NodeRunStatus, TriggerType, Workflow};
use typeflow_store::{SqliteStore, Store};

async fn engine() -> (tempfile::TempDir, Arc<SqliteStore>, ExecutionEngine) {
  let dir = tempfile::tempdir().expect("temp dir");
  let store = Arc::new(
    SqliteStore::connect("sqlite::memory:")
      .await
      .expect("store"),
  );
  let engine = ExecutionEngine::new(
    store.clone(),
    None,
    EngineConfig::new(dir.path().join("packages")),
  );
  (dir, store, engine)
}

fn workflow(value: Value) -> Workflow {
  serde_json::from_value(value).expect("workflow json")
}

fn trigger_code_workflow(code: &str) -> Workflow {
  workflow(json!({
    "organization_id": "org1",
    "workflow_id": "wf1",
    "name": "trigger-code",
    "nodes": [
      {"node_id": "trigger", "kind": "trigger", "label": "Start"},
      {"node_id": "code", "kind": "code", "label": "Process", "config": {"code": code}}
    ],
    "connections": [
      {"source_node_id": "trigger", "target_node_id": "code"}
    ]
  }))
}

#[tokio::test]
async fn identity_code_returns_trigger_data() {
  let (_dir, _store, engine) = engine().await;
  let wf = trigger_code_workflow("return $input;");

  let execution = engine
    .execute(
      &wf,
      TriggerType::Manual,
      Some(json!({"a": 1})),
      None,
      CancellationToken::new(),
    )
    .await
    .unwrap();

  assert_eq!(execution.status, ExecutionStatus::Completed);
  assert_eq!(
    serde_json::to_value(&execution.result).unwrap(),
    json!([{"json": {"a": 1}}])
  );
}

#[tokio::test]
async fn executing_twice_is_deterministic() {
  let (_dir, _store, engine) = engine().await;
  let wf = trigger_code_workflow("return { n: $json.a * 2 };");

  let first = engine
    .execute(
      &wf,
      TriggerType::Manual,
      Some(json!({"a": 3})),
      None,
      CancellationToken::new(),
    )
    .await
    .unwrap();
  let second = engine
    .execute(
      &wf,
      TriggerType::Manual,
      Some(json!({"a": 3})),
      None,
      CancellationToken::new(),
    )
    .await
    .unwrap();

  let order = |e: &typeflow_model::Execution| {
    e.node_results
      .iter()
      .map(|r| r.node_id.clone())
      .collect::<Vec<_>>()
  };
  assert_eq!(order(&first), order(&second));
  assert_eq!(first.result, second.result);
}

fn if_workflow() -> Workflow {
  workflow(json!({
    "organization_id": "org1",
    "workflow_id": "wf-if",
    "name": "branching",
    "nodes": [
      {"node_id": "trigger", "kind": "trigger", "label": "Start"},
      {"node_id": "check", "kind": "if", "label": "Check", "config": {
        "condition": {"field": "n", "operator": "greaterThan", "value": 0}
      }},
      {"node_id": "pos", "kind": "code", "label": "Positive", "config": {"code": "return { x: 'pos' };"}},
      {"node_id": "neg", "kind": "code", "label": "Negative", "config": {"code": "return { x: 'neg' };"}}
    ],
    "connections": [
      {"source_node_id": "trigger", "target_node_id": "check"},
      {"source_node_id": "check", "source_handle": "true", "target_node_id": "pos"},
      {"source_node_id": "check", "source_handle": "false", "target_node_id": "neg"}
    ]
  }))
}

#[tokio::test]
async fn if_activates_exactly_one_branch() {
  let (_dir, _store, engine) = engine().await;
  let wf = if_workflow();

  let execution = engine
    .execute(
      &wf,
      TriggerType::Manual,
      Some(json!({"n": 3})),
      None,
      CancellationToken::new(),
    )
    .await
    .unwrap();
  assert_eq!(
    serde_json::to_value(&execution.result).unwrap(),
    json!([{"json": {"x": "pos"}}])
  );
  // The inactive branch is skipped, never executed.
  let neg = execution.node_result("neg").unwrap();
  assert_eq!(neg.status, NodeRunStatus::Skipped);

  let execution = engine
    .execute(
      &wf,
      TriggerType::Manual,
      Some(json!({"n": -1})),
      None,
      CancellationToken::new(),
    )
    .await
    .unwrap();
  assert_eq!(
    serde_json::to_value(&execution.result).unwrap(),
    json!([{"json": {"x": "neg"}}])
  );
}

fn merge_workflow(mode: &str) -> Workflow {
  workflow(json!({
    "organization_id": "org1",
    "workflow_id": "wf-merge",
    "name": "fan-in",
    "nodes": [
      {"node_id": "trigger", "kind": "trigger", "label": "Start"},
      {"node_id": "a", "kind": "code", "label": "A", "execution_order": 1,
       "config": {"code": "return [{ json: { k: 1 } }];"}},
      {"node_id": "b", "kind": "code", "label": "B", "execution_order": 2,
       "config": {"code": "return [{ json: { k: 2 } }, { json: { k: 3 } }];"}},
      {"node_id": "merge", "kind": "merge", "label": "Merge", "config": {"mode": mode}},
      {"node_id": "out", "kind": "code", "label": "Out", "config": {"code": "return $input;"}}
    ],
    "connections": [
      {"source_node_id": "trigger", "target_node_id": "a"},
      {"source_node_id": "trigger", "target_node_id": "b"},
      {"source_node_id": "a", "target_node_id": "merge"},
      {"source_node_id": "b", "target_node_id": "merge"},
      {"source_node_id": "merge", "target_node_id": "out"}
    ]
  }))
}

#[tokio::test]
async fn merge_append_preserves_source_order() {
  let (_dir, _store, engine) = engine().await;
  let execution = engine
    .execute(
      &merge_workflow("append"),
      TriggerType::Manual,
      None,
      None,
      CancellationToken::new(),
    )
    .await
    .unwrap();

  assert_eq!(execution.status, ExecutionStatus::Completed);
  let ks: Vec<Value> = execution
    .result
    .iter()
    .map(|item| item.json["k"].clone())
    .collect();
  assert_eq!(ks, vec![json!(1), json!(2), json!(3)]);
}

#[tokio::test]
async fn no_node_runs_before_its_predecessors() {
  let (_dir, _store, engine) = engine().await;
  let execution = engine
    .execute(
      &merge_workflow("append"),
      TriggerType::Manual,
      None,
      None,
      CancellationToken::new(),
    )
    .await
    .unwrap();

  let position = |node: &str| {
    execution
      .node_results
      .iter()
      .position(|r| r.node_id == node)
      .unwrap()
  };
  assert!(position("trigger") < position("a"));
  assert!(position("a") < position("merge"));
  assert!(position("b") < position("merge"));
  assert!(position("merge") < position("out"));
}

#[tokio::test]
async fn failure_short_circuits_descendants() {
  let (_dir, _store, engine) = engine().await;
  let wf = workflow(json!({
    "organization_id": "org1",
    "workflow_id": "wf-fail",
    "name": "failing",
    "nodes": [
      {"node_id": "trigger", "kind": "trigger", "label": "Start"},
      {"node_id": "boom", "kind": "code", "label": "Boom",
       "config": {"code": "throw new Error('exploded');"}},
      {"node_id": "after", "kind": "code", "label": "After", "config": {"code": "return 1;"}}
    ],
    "connections": [
      {"source_node_id": "trigger", "target_node_id": "boom"},
      {"source_node_id": "boom", "target_node_id": "after"}
    ]
  }));

  let execution = engine
    .execute(&wf, TriggerType::Manual, None, None, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(execution.status, ExecutionStatus::Failed);
  assert!(execution.error.as_deref().unwrap().contains("exploded"));
  let boom = execution.node_result("boom").unwrap();
  assert_eq!(boom.status, NodeRunStatus::Failed);
  // The descendant is never scheduled.
  assert!(execution.node_result("after").is_none());
}

#[tokio::test]
async fn busy_loop_fails_with_timeout() {
  let dir = tempfile::tempdir().unwrap();
  let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
  let mut config = EngineConfig::new(dir.path().join("packages"));
  config.code_timeout = std::time::Duration::from_millis(300);
  let engine = ExecutionEngine::new(store, None, config);

  let wf = trigger_code_workflow("while (true) {}");
  let execution = engine
    .execute(&wf, TriggerType::Manual, None, None, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(execution.status, ExecutionStatus::Failed);
  assert!(execution.error.as_deref().unwrap().contains("TimeoutError"));
}

#[tokio::test]
async fn merge_by_position_treats_inactive_branch_as_empty() {
  let (_dir, _store, engine) = engine().await;
  // Only the true branch fires; the merge zips with an empty second input.
  let wf = workflow(json!({
    "organization_id": "org1",
    "workflow_id": "wf-zip",
    "name": "zip-with-hole",
    "nodes": [
      {"node_id": "trigger", "kind": "trigger", "label": "Start"},
      {"node_id": "check", "kind": "if", "label": "Check", "config": {
        "condition": {"field": "go", "operator": "equals", "value": true}
      }},
      {"node_id": "yes", "kind": "code", "label": "Yes", "execution_order": 1,
       "config": {"code": "return [{ json: { a: 1 } }];"}},
      {"node_id": "no", "kind": "code", "label": "No", "execution_order": 2,
       "config": {"code": "return [{ json: { b: 1 } }];"}},
      {"node_id": "merge", "kind": "merge", "label": "Zip", "config": {"mode": "mergeByPosition"}}
    ],
    "connections": [
      {"source_node_id": "trigger", "target_node_id": "check"},
      {"source_node_id": "check", "source_handle": "true", "target_node_id": "yes"},
      {"source_node_id": "check", "source_handle": "false", "target_node_id": "no"},
      {"source_node_id": "yes", "target_node_id": "merge"},
      {"source_node_id": "no", "target_node_id": "merge"}
    ]
  }));

  let execution = engine
    .execute(
      &wf,
      TriggerType::Manual,
      Some(json!({"go": true})),
      None,
      CancellationToken::new(),
    )
    .await
    .unwrap();

  assert_eq!(execution.status, ExecutionStatus::Completed);
  assert_eq!(execution.result.len(), 1);
  assert_eq!(execution.result[0].json.get("a"), Some(&json!(1)));
  assert_eq!(execution.result[0].json.get("b"), None);
}

#[tokio::test]
async fn run_until_executes_only_ancestors() {
  let (_dir, _store, engine) = engine().await;
  let wf = workflow(json!({
    "organization_id": "org1",
    "workflow_id": "wf-until",
    "name": "run-until",
    "nodes": [
      {"node_id": "trigger", "kind": "trigger", "label": "Start"},
      {"node_id": "first", "kind": "code", "label": "First", "config": {"code": "return { step: 1 };"}},
      {"node_id": "second", "kind": "code", "label": "Second", "config": {"code": "return { step: 2 };"}},
      {"node_id": "third", "kind": "code", "label": "Third", "config": {"code": "return { step: 3 };"}}
    ],
    "connections": [
      {"source_node_id": "trigger", "target_node_id": "first"},
      {"source_node_id": "first", "target_node_id": "second"},
      {"source_node_id": "second", "target_node_id": "third"}
    ]
  }));

  let execution = engine
    .execute(
      &wf,
      TriggerType::Manual,
      None,
      Some("second"),
      CancellationToken::new(),
    )
    .await
    .unwrap();

  assert_eq!(execution.status, ExecutionStatus::Completed);
  assert!(execution.node_result("second").is_some());
  assert!(execution.node_result("third").is_none());
  assert_eq!(execution.result[0].json.get("step"), Some(&json!(2)));
}

#[tokio::test]
async fn predecessor_labels_are_injected() {
  let (_dir, _store, engine) = engine().await;
  let wf = workflow(json!({
    "organization_id": "org1",
    "workflow_id": "wf-labels",
    "name": "labels",
    "nodes": [
      {"node_id": "trigger", "kind": "trigger", "label": "Start"},
      {"node_id": "fetch", "kind": "code", "label": "Fetch Users",
       "config": {"code": "return { count: 3 };"}},
      {"node_id": "use", "kind": "code", "label": "Use",
       "config": {"code": "return { fromLabel: $Fetch_Users.json.count, fromStart: Object.keys($Start.json).length };"}}
    ],
    "connections": [
      {"source_node_id": "trigger", "target_node_id": "fetch"},
      {"source_node_id": "fetch", "target_node_id": "use"}
    ]
  }));

  let execution = engine
    .execute(&wf, TriggerType::Manual, None, None, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(execution.status, ExecutionStatus::Completed);
  assert_eq!(execution.result[0].json.get("fromLabel"), Some(&json!(3)));
}

#[tokio::test]
async fn utilities_are_available_to_code_nodes() {
  let (_dir, _store, engine) = engine().await;
  let wf = workflow(json!({
    "organization_id": "org1",
    "workflow_id": "wf-utils",
    "name": "utilities",
    "nodes": [
      {"node_id": "trigger", "kind": "trigger", "label": "Start"},
      {"node_id": "helpers", "kind": "utilities", "label": "Helpers",
       "config": {"code": "exports.double = (n) => n * 2;"}},
      {"node_id": "code", "kind": "code", "label": "Use",
       "config": {"code": "return { result: $Helpers.double(21) };"}}
    ],
    "connections": [
      {"source_node_id": "trigger", "target_node_id": "code"}
    ]
  }));

  let execution = engine
    .execute(&wf, TriggerType::Manual, None, None, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(execution.status, ExecutionStatus::Completed);
  assert_eq!(execution.result[0].json.get("result"), Some(&json!(42)));
}

#[tokio::test]
async fn sub_workflow_once_receives_the_batch() {
  let (_dir, store, engine) = engine().await;

  let callee = workflow(json!({
    "organization_id": "org1",
    "workflow_id": "wf-callee",
    "name": "callee",
    "nodes": [
      {"node_id": "input", "kind": "workflowInput", "label": "In"},
      {"node_id": "double", "kind": "code", "label": "Double",
       "config": {"code": "return $input.map(i => ({ json: { n: i.json.n * 2 } }));"}},
      {"node_id": "output", "kind": "workflowOutput", "label": "OutPort"}
    ],
    "connections": [
      {"source_node_id": "input", "target_node_id": "double"},
      {"source_node_id": "double", "target_node_id": "output"}
    ]
  }));
  store.save_workflow(&callee).await.unwrap();

  let caller = workflow(json!({
    "organization_id": "org1",
    "workflow_id": "wf-caller",
    "name": "caller",
    "nodes": [
      {"node_id": "trigger", "kind": "trigger", "label": "Start"},
      {"node_id": "seed", "kind": "code", "label": "Seed",
       "config": {"code": "return [{ json: { n: 1 } }, { json: { n: 2 } }];"}},
      {"node_id": "call", "kind": "executeWorkflow", "label": "Call",
       "config": {"workflow_id": "wf-callee", "mode": "once"}}
    ],
    "connections": [
      {"source_node_id": "trigger", "target_node_id": "seed"},
      {"source_node_id": "seed", "target_node_id": "call"}
    ]
  }));

  let execution = engine
    .execute(
      &caller,
      TriggerType::Manual,
      None,
      None,
      CancellationToken::new(),
    )
    .await
    .unwrap();

  assert_eq!(execution.status, ExecutionStatus::Completed);
  let ns: Vec<Value> = execution
    .result
    .iter()
    .map(|item| item.json["n"].clone())
    .collect();
  assert_eq!(ns, vec![json!(2), json!(4)]);

  // The callee ran with its own execution row linked to the caller.
  let sub_executions = store.list_executions("wf-callee").await.unwrap();
  assert_eq!(sub_executions.len(), 1);
  assert_eq!(
    sub_executions[0].parent_execution_id.as_deref(),
    Some(execution.execution_id.as_str())
  );
}

#[tokio::test]
async fn sub_workflow_foreach_pairs_outputs_to_inputs() {
  let (_dir, store, engine) = engine().await;

  let callee = workflow(json!({
    "organization_id": "org1",
    "workflow_id": "wf-callee-each",
    "name": "callee",
    "nodes": [
      {"node_id": "input", "kind": "workflowInput", "label": "In"},
      {"node_id": "bump", "kind": "code", "label": "Bump",
       "config": {"code": "return { n: $json.n + 10 };"}}
    ],
    "connections": [
      {"source_node_id": "input", "target_node_id": "bump"}
    ]
  }));
  store.save_workflow(&callee).await.unwrap();

  let caller = workflow(json!({
    "organization_id": "org1",
    "workflow_id": "wf-caller-each",
    "name": "caller",
    "nodes": [
      {"node_id": "trigger", "kind": "trigger", "label": "Start"},
      {"node_id": "seed", "kind": "code", "label": "Seed",
       "config": {"code": "return [{ json: { n: 1 } }, { json: { n: 2 } }];"}},
      {"node_id": "call", "kind": "executeWorkflow", "label": "Call",
       "config": {"workflow_id": "wf-callee-each", "mode": "foreach"}}
    ],
    "connections": [
      {"source_node_id": "trigger", "target_node_id": "seed"},
      {"source_node_id": "seed", "target_node_id": "call"}
    ]
  }));

  let execution = engine
    .execute(
      &caller,
      TriggerType::Manual,
      None,
      None,
      CancellationToken::new(),
    )
    .await
    .unwrap();

  assert_eq!(execution.status, ExecutionStatus::Completed);
  assert_eq!(execution.result.len(), 2);
  assert_eq!(execution.result[0].json.get("n"), Some(&json!(11)));
  assert_eq!(execution.result[0].paired_item, Some(0));
  assert_eq!(execution.result[1].json.get("n"), Some(&json!(12)));
  assert_eq!(execution.result[1].paired_item, Some(1));
}

#[tokio::test]
async fn missing_sub_workflow_fails_the_caller_node() {
  let (_dir, _store, engine) = engine().await;
  let caller = workflow(json!({
    "organization_id": "org1",
    "workflow_id": "wf-ghost-call",
    "name": "caller",
    "nodes": [
      {"node_id": "trigger", "kind": "trigger", "label": "Start"},
      {"node_id": "call", "kind": "executeWorkflow", "label": "Call",
       "config": {"workflow_id": "ghost", "mode": "once"}}
    ],
    "connections": [
      {"source_node_id": "trigger", "target_node_id": "call"}
    ]
  }));

  let execution = engine
    .execute(
      &caller,
      TriggerType::Manual,
      None,
      None,
      CancellationToken::new(),
    )
    .await
    .unwrap();

  assert_eq!(execution.status, ExecutionStatus::Failed);
  assert!(execution.error.as_deref().unwrap().contains("not found"));
}

#[tokio::test]
async fn cancelled_token_stops_before_any_node() {
  let (_dir, store, engine) = engine().await;
  let wf = trigger_code_workflow("return 1;");

  let cancel = CancellationToken::new();
  cancel.cancel();
  let execution = engine
    .execute(&wf, TriggerType::Manual, None, None, cancel)
    .await
    .unwrap();

  assert_eq!(execution.status, ExecutionStatus::Cancelled);
  assert!(execution.node_results.is_empty());
  let persisted = store
    .get_execution(&execution.execution_id)
    .await
    .unwrap();
  assert_eq!(persisted.status, ExecutionStatus::Cancelled);
}

#[tokio::test]
async fn non_invoked_trigger_feeds_empty_input() {
  let (_dir, _store, engine) = engine().await;
  // Manual run of a workflow that also has a webhook trigger; the join
  // after both must not deadlock on the webhook side.
  let wf = workflow(json!({
    "organization_id": "org1",
    "workflow_id": "wf-two-triggers",
    "name": "two-triggers",
    "nodes": [
      {"node_id": "manual", "kind": "trigger", "label": "Manual", "execution_order": 1},
      {"node_id": "hook", "kind": "webhook", "label": "Hook", "execution_order": 2},
      {"node_id": "merge", "kind": "merge", "label": "Join", "config": {"mode": "append"}},
      {"node_id": "count", "kind": "code", "label": "Count",
       "config": {"code": "return { items: $input.length };"}}
    ],
    "connections": [
      {"source_node_id": "manual", "target_node_id": "merge"},
      {"source_node_id": "hook", "target_node_id": "merge"},
      {"source_node_id": "merge", "target_node_id": "count"}
    ]
  }));

  let execution = engine
    .execute(
      &wf,
      TriggerType::Manual,
      Some(json!({"a": 1})),
      None,
      CancellationToken::new(),
    )
    .await
    .unwrap();

  assert_eq!(execution.status, ExecutionStatus::Completed);
  // Only the manual trigger's item arrives at the merge.
  assert_eq!(execution.result[0].json.get("items"), Some(&json!(1)));
  assert!(execution.node_result("hook").is_none());
}

#[tokio::test]
async fn remove_duplicates_in_flow() {
  let (_dir, _store, engine) = engine().await;
  let wf = workflow(json!({
    "organization_id": "org1",
    "workflow_id": "wf-dedupe",
    "name": "dedupe",
    "nodes": [
      {"node_id": "trigger", "kind": "trigger", "label": "Start"},
      {"node_id": "seed", "kind": "code", "label": "Seed",
       "config": {"code": "return [{ json: { id: 1 } }, { json: { id: 1 } }, { json: { id: 2 } }];"}},
      {"node_id": "dedupe", "kind": "removeDuplicates", "label": "Dedupe", "config": {"field": "id"}}
    ],
    "connections": [
      {"source_node_id": "trigger", "target_node_id": "seed"},
      {"source_node_id": "seed", "target_node_id": "dedupe"}
    ]
  }));

  let execution = engine
    .execute(&wf, TriggerType::Manual, None, None, CancellationToken::new())
    .await
    .unwrap();

  assert_eq!(execution.status, ExecutionStatus::Completed);
  assert_eq!(execution.result.len(), 2);
}
