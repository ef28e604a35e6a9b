//! The queue worker pool.
//!
//! Consumes jobs with bounded concurrency and a global rate cap, drives the
//! executor, and reports results. Shutdown drains in-flight jobs before
//! returning.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use typeflow_executor::ExecutionEngine;
use typeflow_model::ExecutionStatus;

use crate::job::{WorkflowJob, WorkflowJobResult};

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
  /// Concurrent jobs (default 5, `WORKER_CONCURRENCY`).
  pub concurrency: usize,
  /// Global cap on job starts per second.
  pub jobs_per_second: u32,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      concurrency: 5,
      jobs_per_second: 10,
    }
  }
}

/// Consumes queued workflow jobs and drives the executor.
pub struct QueueWorker {
  engine: Arc<ExecutionEngine>,
  config: WorkerConfig,
  limiter: DefaultDirectRateLimiter,
}

impl QueueWorker {
  pub fn new(engine: Arc<ExecutionEngine>, config: WorkerConfig) -> Self {
    let rate = NonZeroU32::new(config.jobs_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
    let limiter = RateLimiter::direct(Quota::per_second(rate));
    Self {
      engine,
      config,
      limiter,
    }
  }

  /// Run until cancelled or the queue closes, then drain in-flight jobs.
  ///
  /// Results go to `results` when provided; execution rows are persisted by
  /// the engine either way.
  #[instrument(name = "queue_worker_run", skip_all)]
  pub async fn run(
    &self,
    mut jobs: mpsc::UnboundedReceiver<WorkflowJob>,
    results: Option<mpsc::UnboundedSender<WorkflowJobResult>>,
    cancel: CancellationToken,
  ) {
    let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
    info!(concurrency = self.config.concurrency, "queue worker started");

    loop {
      let job = tokio::select! {
        _ = cancel.cancelled() => break,
        job = jobs.recv() => match job {
          Some(job) => job,
          None => break,
        },
      };

      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = self.limiter.until_ready() => {}
      }

      let permit = match semaphore.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => break,
      };

      let engine = self.engine.clone();
      let results = results.clone();
      tokio::spawn(async move {
        let result = process_job(engine, &job).await;
        if let Some(results) = &results {
          let _ = results.send(result);
        }
        drop(permit);
      });
    }

    // Drain: every permit back means every spawned job finished.
    info!("queue worker draining");
    match semaphore.acquire_many(self.config.concurrency as u32).await {
      Ok(_) => info!("queue worker stopped"),
      Err(_) => warn!("queue worker semaphore closed during drain"),
    }
  }
}

/// Execute one job and shape its result. Executor failures are captured,
/// not retried.
async fn process_job(engine: Arc<ExecutionEngine>, job: &WorkflowJob) -> WorkflowJobResult {
  let started = Instant::now();
  info!(job_id = %job.job_id, workflow_id = %job.workflow_id, "job_started");

  let outcome = async {
    let workflow = engine
      .store()
      .get_workflow(&job.organization_id, &job.workflow_id)
      .await
      .map_err(|e| e.to_string())?;
    engine
      .execute(
        &workflow,
        job.trigger,
        job.input.clone(),
        None,
        CancellationToken::new(),
      )
      .await
      .map_err(|e| e.to_string())
  }
  .await;

  let execution_time_ms = started.elapsed().as_millis() as u64;
  match outcome {
    Ok(execution) => {
      let success = execution.status == ExecutionStatus::Completed;
      if success {
        info!(job_id = %job.job_id, execution_time_ms, "job_completed");
      } else {
        warn!(
          job_id = %job.job_id,
          error = %execution.error.as_deref().unwrap_or(""),
          "job_execution_failed"
        );
      }
      WorkflowJobResult {
        job_id: job.job_id.clone(),
        success,
        outputs: execution.result.clone(),
        execution_id: Some(execution.execution_id.clone()),
        execution_time_ms,
        error: execution.error.clone(),
        node_results: execution.node_results,
      }
    }
    Err(message) => {
      error!(job_id = %job.job_id, error = %message, "job_failed");
      WorkflowJobResult {
        job_id: job.job_id.clone(),
        success: false,
        outputs: Vec::new(),
        execution_id: None,
        execution_time_ms,
        error: Some(message),
        node_results: Vec::new(),
      }
    }
  }
}
