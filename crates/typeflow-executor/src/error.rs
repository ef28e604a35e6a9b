//! Executor errors.
//!
//! Node-level failures (thrown user code, timeouts, bad configs) are not
//! errors at this level; they are recorded on the execution's node results
//! and fail the execution. `ExecutorError` covers infrastructure failures.

/// Errors that abort an execution outright.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
  /// Node not found in workflow.
  #[error("node '{node_id}' not found in workflow")]
  NodeNotFound { node_id: String },

  /// Invalid workflow graph.
  #[error("invalid workflow graph: {message}")]
  InvalidGraph { message: String },

  /// Sub-workflow nesting exceeded the configured limit.
  #[error("sub-workflow depth limit {limit} exceeded")]
  DepthLimit { limit: usize },

  /// Execution was cancelled.
  #[error("execution cancelled")]
  Cancelled,

  /// The sandbox could not be constructed.
  #[error("sandbox setup failed: {0}")]
  Sandbox(String),

  /// A storage operation failed.
  #[error(transparent)]
  Store(#[from] typeflow_store::Error),
}
