//! Typeflow Sandbox
//!
//! QuickJS runtime for `code` and `utilities` nodes.
//!
//! The pipeline per invocation: rewrite imports into `require(...)` calls
//! rooted at the organization's package directory, compile-check the wrapped
//! source (suppressing the fixed diagnostic list), inject the node's context
//! (`$input`, `$json`, predecessor `$<label>` bindings, utility modules,
//! `$credentials`, `console`), evaluate, and enforce the wall-clock timeout
//! with an interrupt handler plus an outer timer.

mod check;
mod error;
mod logsink;
mod prepare;
mod resolver;
mod runtime;

pub use error::{Diagnostic, SandboxError};
pub use logsink::LogSink;
pub use prepare::{PreparedScript, rewrite_imports, wrap_for_check, wrap_for_run};
pub use resolver::ModuleResolver;
pub use runtime::{CodeInvocation, PredecessorBinding, Sandbox, SandboxConfig};
