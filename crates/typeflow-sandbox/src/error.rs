//! Sandbox errors.

/// A static-check diagnostic with positions in the original source.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
  pub line: usize,
  pub col: usize,
  pub message: String,
}

impl std::fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "({},{}): {}", self.line, self.col, self.message)
  }
}

/// Errors from preparing or executing a code node.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
  /// The static check rejected the source.
  #[error("type validation failed: {}", format_diagnostics(.diagnostics))]
  TypeValidation { diagnostics: Vec<Diagnostic> },

  /// The wall-clock timeout elapsed.
  #[error("code execution timed out after {timeout_ms}ms")]
  Timeout { timeout_ms: u64 },

  /// User code threw.
  #[error("{message}")]
  Runtime { message: String },

  /// The engine itself failed.
  #[error("sandbox internal error: {0}")]
  Internal(String),
}

fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
  diagnostics
    .iter()
    .map(|d| d.to_string())
    .collect::<Vec<_>>()
    .join("; ")
}
