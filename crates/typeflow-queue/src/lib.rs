//! Typeflow Queue
//!
//! Job queue trait, in-memory implementation, and the bounded worker pool
//! that consumes queued executions.

mod job;
mod queue;
mod worker;

pub use job::{WorkflowJob, WorkflowJobResult};
pub use queue::{InMemoryQueue, JobQueue, QueueError};
pub use worker::{QueueWorker, WorkerConfig};

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use serde_json::json;
  use tokio::sync::mpsc;
  use tokio_util::sync::CancellationToken;
  use typeflow_executor::{EngineConfig, ExecutionEngine};
  use typeflow_model::{TriggerType, Workflow};
  use typeflow_store::{SqliteStore, Store};

  use super::*;

  async fn setup() -> (tempfile::TempDir, Arc<SqliteStore>, Arc<ExecutionEngine>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::connect("sqlite::memory:").await.unwrap());
    let engine = Arc::new(ExecutionEngine::new(
      store.clone(),
      None,
      EngineConfig::new(dir.path().join("packages")),
    ));
    (dir, store, engine)
  }

  fn simple_workflow() -> Workflow {
    serde_json::from_value(json!({
      "organization_id": "org1",
      "workflow_id": "wf1",
      "name": "simple",
      "nodes": [
        {"node_id": "trigger", "kind": "trigger", "label": "Start"},
        {"node_id": "code", "kind": "code", "label": "Echo", "config": {"code": "return $input;"}}
      ],
      "connections": [
        {"source_node_id": "trigger", "target_node_id": "code"}
      ]
    }))
    .unwrap()
  }

  #[tokio::test]
  async fn worker_consumes_jobs_and_reports_results() {
    let (_dir, store, engine) = setup().await;
    store.save_workflow(&simple_workflow()).await.unwrap();

    let (queue, receiver) = InMemoryQueue::channel();
    let (results_tx, mut results_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let worker_cancel = cancel.clone();
    let worker = tokio::spawn(async move {
      QueueWorker::new(engine, WorkerConfig::default())
        .run(receiver, Some(results_tx), worker_cancel)
        .await;
    });

    let job = WorkflowJob::new("wf1", "org1", TriggerType::Webhook, Some(json!({"x": 1})));
    let job_id = queue.enqueue(job).unwrap();

    let result = results_rx.recv().await.unwrap();
    assert_eq!(result.job_id, job_id);
    assert!(result.success);
    assert_eq!(result.outputs[0].json.get("x"), Some(&json!(1)));

    // The execution row was persisted by the engine.
    let executions = store.list_executions("wf1").await.unwrap();
    assert_eq!(executions.len(), 1);

    cancel.cancel();
    worker.await.unwrap();
  }

  #[tokio::test]
  async fn missing_workflow_fails_the_job_without_retry() {
    let (_dir, _store, engine) = setup().await;

    let (queue, receiver) = InMemoryQueue::channel();
    let (results_tx, mut results_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let worker_cancel = cancel.clone();
    let worker = tokio::spawn(async move {
      QueueWorker::new(engine, WorkerConfig::default())
        .run(receiver, Some(results_tx), worker_cancel)
        .await;
    });

    queue
      .enqueue(WorkflowJob::new("ghost", "org1", TriggerType::Webhook, None))
      .unwrap();

    let result = results_rx.recv().await.unwrap();
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("not found"));
    // Exactly one result: no redelivery.
    assert!(results_rx.try_recv().is_err());

    cancel.cancel();
    worker.await.unwrap();
  }

  #[tokio::test]
  async fn closing_the_queue_stops_the_worker() {
    let (_dir, store, engine) = setup().await;
    store.save_workflow(&simple_workflow()).await.unwrap();

    let (queue, receiver) = InMemoryQueue::channel();
    let (results_tx, mut results_rx) = mpsc::unbounded_channel();

    let worker = tokio::spawn(async move {
      QueueWorker::new(engine, WorkerConfig::default())
        .run(receiver, Some(results_tx), CancellationToken::new())
        .await;
    });

    queue
      .enqueue(WorkflowJob::new("wf1", "org1", TriggerType::Webhook, None))
      .unwrap();
    drop(queue);

    // The in-flight job still completes before the worker exits.
    let result = results_rx.recv().await.unwrap();
    assert!(result.success);
    worker.await.unwrap();
  }
}
