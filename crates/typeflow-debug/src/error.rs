//! Debug controller errors.

/// Errors from debug-session operations.
#[derive(Debug, thiserror::Error)]
pub enum DebugError {
  /// The session is completed or terminated and accepts no operations.
  #[error("debug session '{session_id}' has ended")]
  SessionEnded { session_id: String },

  #[error(transparent)]
  Executor(#[from] typeflow_executor::ExecutorError),

  #[error(transparent)]
  Store(#[from] typeflow_store::Error),
}
