//! Ingress pipeline tests over the axum router.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use typeflow_executor::{EngineConfig, ExecutionEngine};
use typeflow_model::{Webhook, Workflow};
use typeflow_queue::InMemoryQueue;
use typeflow_store::{SqliteStore, Store};
use typeflow_webhook::{IngressState, router};

struct TestBed {
  app: Router,
  store: Arc<SqliteStore>,
  _dir: tempfile::TempDir,
}

async fn testbed(with_queue: bool) -> TestBed {
  let dir = tempfile::tempdir().expect("temp dir");
  let store = Arc::new(
    SqliteStore::connect("sqlite::memory:")
      .await
      .expect("store"),
  );
  let engine = Arc::new(ExecutionEngine::new(
    store.clone(),
    None,
    EngineConfig::new(dir.path().join("packages")),
  ));
  let queue = if with_queue {
    let (queue, _receiver) = InMemoryQueue::channel();
    // The receiver is parked; 202 responses do not depend on a worker.
    std::mem::forget(_receiver);
    Some(Arc::new(queue) as Arc<dyn typeflow_queue::JobQueue>)
  } else {
    None
  };
  let app = router(Arc::new(IngressState::new(store.clone(), engine, queue)));
  TestBed {
    app,
    store,
    _dir: dir,
  }
}

fn echo_workflow() -> Workflow {
  serde_json::from_value(json!({
    "organization_id": "org1",
    "workflow_id": "wf1",
    "name": "echo",
    "nodes": [
      {"node_id": "hook", "kind": "webhook", "label": "Hook"},
      {"node_id": "code", "kind": "code", "label": "Echo",
       "config": {"code": "return { got: $json.body };"}}
    ],
    "connections": [
      {"source_node_id": "hook", "target_node_id": "code"}
    ]
  }))
  .expect("workflow")
}

fn webhook(value: Value) -> Webhook {
  serde_json::from_value(value).expect("webhook")
}

async fn seed(store: &SqliteStore, webhook_value: Value) {
  store.save_workflow(&echo_workflow()).await.unwrap();
  store.save_webhook(&webhook(webhook_value)).await.unwrap();
}

async fn body_json(response: axum::response::Response) -> Value {
  let bytes = response.into_body().collect().await.unwrap().to_bytes();
  serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

fn post(uri: &str, body: Value) -> Request<Body> {
  Request::builder()
    .method("POST")
    .uri(uri)
    .header("content-type", "application/json")
    .body(Body::from(body.to_string()))
    .expect("request")
}

#[tokio::test]
async fn unknown_webhook_is_404() {
  let bed = testbed(false).await;
  let response = bed
    .app
    .oneshot(post("/api/webhooks/org1/ghost", json!({})))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn synchronous_dispatch_returns_the_shaped_output() {
  let bed = testbed(false).await;
  seed(
    &bed.store,
    json!({
      "webhook_id": "wh1",
      "organization_id": "org1",
      "path": "hook",
      "workflow_id": "wf1"
    }),
  )
  .await;

  let response = bed
    .app
    .oneshot(post("/api/webhooks/org1/hook", json!({"n": 7})))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  let body = body_json(response).await;
  assert_eq!(body, json!({"got": {"n": 7}}));

  // The request was captured and the execution persisted.
  let latest = bed.store.latest_webhook_request("wh1").await.unwrap();
  assert_eq!(latest.body, json!({"n": 7}));
  assert_eq!(bed.store.list_executions("wf1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn single_value_outputs_unwrap_raw() {
  let bed = testbed(false).await;
  bed
    .store
    .save_workflow(
      &serde_json::from_value::<Workflow>(json!({
        "organization_id": "org1",
        "workflow_id": "wf1",
        "name": "scalar",
        "nodes": [
          {"node_id": "hook", "kind": "webhook", "label": "Hook"},
          {"node_id": "code", "kind": "code", "label": "Scalar",
           "config": {"code": "return 42;"}}
        ],
        "connections": [
          {"source_node_id": "hook", "target_node_id": "code"}
        ]
      }))
      .unwrap(),
    )
    .await
    .unwrap();
  bed
    .store
    .save_webhook(&webhook(json!({
      "webhook_id": "wh1",
      "organization_id": "org1",
      "path": "hook",
      "workflow_id": "wf1"
    })))
    .await
    .unwrap();

  let response = bed
    .app
    .oneshot(post("/api/webhooks/org1/hook", json!({})))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(body_json(response).await, json!(42));
}

#[tokio::test]
async fn bearer_auth_failure_is_401_and_runs_nothing() {
  let bed = testbed(false).await;
  seed(
    &bed.store,
    json!({
      "webhook_id": "wh1",
      "organization_id": "org1",
      "path": "hook",
      "workflow_id": "wf1",
      "auth_type": "bearer",
      "auth_config": {"token": "T"}
    }),
  )
  .await;

  let request = Request::builder()
    .method("POST")
    .uri("/api/webhooks/org1/hook")
    .header("authorization", "Bearer X")
    .header("content-type", "application/json")
    .body(Body::from("{}"))
    .unwrap();
  let response = bed.app.oneshot(request).await.unwrap();

  assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
  // No execution row was created.
  assert!(bed.store.list_executions("wf1").await.unwrap().is_empty());
}

#[tokio::test]
async fn inactive_webhook_is_403() {
  let bed = testbed(false).await;
  seed(
    &bed.store,
    json!({
      "webhook_id": "wh1",
      "organization_id": "org1",
      "path": "hook",
      "workflow_id": "wf1",
      "is_active": false
    }),
  )
  .await;

  let response = bed
    .app
    .oneshot(post("/api/webhooks/org1/hook", json!({})))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn method_mismatch_is_405() {
  let bed = testbed(false).await;
  seed(
    &bed.store,
    json!({
      "webhook_id": "wh1",
      "organization_id": "org1",
      "path": "hook",
      "workflow_id": "wf1",
      "method": "POST"
    }),
  )
  .await;

  let request = Request::builder()
    .method("GET")
    .uri("/api/webhooks/org1/hook")
    .body(Body::empty())
    .unwrap();
  let response = bed.app.oneshot(request).await.unwrap();
  assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn rate_limit_rejects_with_retry_after() {
  let bed = testbed(false).await;
  seed(
    &bed.store,
    json!({
      "webhook_id": "wh1",
      "organization_id": "org1",
      "path": "hook",
      "workflow_id": "wf1",
      "rate_limit": 2
    }),
  )
  .await;

  for _ in 0..2 {
    let response = bed
      .app
      .clone()
      .oneshot(post("/api/webhooks/org1/hook", json!({})))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
  }

  let response = bed
    .app
    .oneshot(post("/api/webhooks/org1/hook", json!({})))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
  assert!(response.headers().contains_key("retry-after"));
  assert!(response.headers().contains_key("x-ratelimit-reset"));
}

#[tokio::test]
async fn respond_immediately_queues_and_returns_202() {
  let bed = testbed(true).await;
  seed(
    &bed.store,
    json!({
      "webhook_id": "wh1",
      "organization_id": "org1",
      "path": "hook",
      "workflow_id": "wf1",
      "response_mode": "respondImmediately"
    }),
  )
  .await;

  let response = bed
    .app
    .oneshot(post("/api/webhooks/org1/hook", json!({"q": 1})))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::ACCEPTED);
  let body = body_json(response).await;
  assert_eq!(body["success"], json!(true));
  assert_eq!(body["status"], json!("queued"));
  assert!(body["jobId"].is_string());
}

#[tokio::test]
async fn failed_execution_returns_500_with_the_node_error() {
  let bed = testbed(false).await;
  bed
    .store
    .save_workflow(
      &serde_json::from_value::<Workflow>(json!({
        "organization_id": "org1",
        "workflow_id": "wf1",
        "name": "boom",
        "nodes": [
          {"node_id": "hook", "kind": "webhook", "label": "Hook"},
          {"node_id": "code", "kind": "code", "label": "Boom",
           "config": {"code": "throw new Error('bad payload');"}}
        ],
        "connections": [
          {"source_node_id": "hook", "target_node_id": "code"}
        ]
      }))
      .unwrap(),
    )
    .await
    .unwrap();
  bed
    .store
    .save_webhook(&webhook(json!({
      "webhook_id": "wh1",
      "organization_id": "org1",
      "path": "hook",
      "workflow_id": "wf1"
    })))
    .await
    .unwrap();

  let response = bed
    .app
    .oneshot(post("/api/webhooks/org1/hook", json!({})))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
  let body = body_json(response).await;
  assert!(
    body["error"]
      .as_str()
      .unwrap()
      .contains("bad payload")
  );
}
