//! Static-check diagnostics and the fixed suppression list.
//!
//! The check phase compiles the wrapped source without invoking it.
//! Diagnostics whose messages match the suppression list are discarded;
//! the list covers conditions the wrapper or runtime handles itself and
//! must stay stable.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::Diagnostic;

/// Suppressed diagnostic fragments (matched case-insensitively):
/// module resolution happens at run time, `return`/`await` are legalized by
/// the wrapper function, and injected names may legitimately be redeclared.
const SUPPRESSED: &[&str] = &[
  "cannot find module",
  "could not resolve module",
  "'require' is not defined",
  "return not in function",
  "'return' not in a function",
  "await in non-async",
  "redeclaration of",
];

pub fn is_suppressed(message: &str) -> bool {
  let lowered = message.to_ascii_lowercase();
  SUPPRESSED.iter().any(|pattern| lowered.contains(pattern))
}

fn eval_position_regex() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"<eval>:(\d+)(?::(\d+))?").unwrap())
}

/// Build a diagnostic from exception details, mapping positions back to the
/// original source by subtracting the wrapper prefix.
pub fn map_diagnostic(
  message: String,
  line: Option<i64>,
  col: Option<i64>,
  stack: Option<&str>,
  line_offset: usize,
) -> Diagnostic {
  let (mut raw_line, mut raw_col) = (line.unwrap_or(0), col.unwrap_or(0));
  if raw_line <= 0 {
    if let Some(stack) = stack {
      if let Some(caps) = eval_position_regex().captures(stack) {
        raw_line = caps
          .get(1)
          .and_then(|m| m.as_str().parse().ok())
          .unwrap_or(0);
        raw_col = caps
          .get(2)
          .and_then(|m| m.as_str().parse().ok())
          .unwrap_or(0);
      }
    }
  }

  let line = (raw_line - line_offset as i64).max(1) as usize;
  let col = raw_col.max(0) as usize;
  Diagnostic { line, col, message }
}
