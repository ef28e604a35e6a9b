use tokio::sync::mpsc;

use crate::job::WorkflowJob;

/// Errors from enqueueing.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
  /// No worker is consuming; the queue is shut down or disabled.
  #[error("job queue is closed")]
  Closed,
}

/// The enqueue seam the webhook ingress dispatches through.
///
/// The in-memory implementation is process-local; redelivery and
/// persistence across restarts are a broker concern this trait leaves to
/// its implementor.
pub trait JobQueue: Send + Sync {
  /// Enqueue a job, returning its id.
  fn enqueue(&self, job: WorkflowJob) -> Result<String, QueueError>;
}

/// In-process queue over an unbounded channel.
pub struct InMemoryQueue {
  sender: mpsc::UnboundedSender<WorkflowJob>,
}

impl InMemoryQueue {
  /// Create the queue and the receiver the worker consumes.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkflowJob>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self { sender }, receiver)
  }
}

impl JobQueue for InMemoryQueue {
  fn enqueue(&self, job: WorkflowJob) -> Result<String, QueueError> {
    let job_id = job.job_id.clone();
    self.sender.send(job).map_err(|_| QueueError::Closed)?;
    Ok(job_id)
  }
}
